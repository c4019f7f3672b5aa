//! Postgres implementation of TransactionStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::domain::{NewTransaction, Transaction, TransactionState};
use crate::ports::{ApplyResult, RepositoryError, RepositoryResult, TransactionStore};

/// Postgres-backed transaction store.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionRepository {
    async fn create(&self, new: &NewTransaction) -> RepositoryResult<Transaction> {
        let row = queries::insert_transaction(&self.pool, new).await?;
        let tx = Transaction::try_from(row)?;
        tracing::debug!(transaction_id = %tx.id, user_id = %tx.user_id, "Transaction inserted");
        Ok(tx)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Transaction> {
        queries::get_transaction(&self.pool, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
            .and_then(Transaction::try_from)
    }

    async fn list(&self) -> RepositoryResult<Vec<Transaction>> {
        queries::list_transactions(&self.pool)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn list_unpublished(&self) -> RepositoryResult<Vec<Transaction>> {
        queries::list_transactions_in_state(&self.pool, TransactionState::Created)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn mark_pending(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(queries::mark_pending(&self.pool, id).await?)
    }

    async fn apply_outcome(
        &self,
        id: Uuid,
        done: bool,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<ApplyResult> {
        if let Some(row) = queries::apply_outcome(&self.pool, id, done, processed_at).await? {
            return Ok(ApplyResult::Applied(Transaction::try_from(row)?));
        }

        // Nothing was updated: either the id is unknown or it was reconciled
        // before. The row is immutable from here on, so a plain read suffices.
        match queries::get_transaction(&self.pool, id).await? {
            Some(row) => Ok(ApplyResult::AlreadyReconciled(Transaction::try_from(row)?)),
            None => Err(RepositoryError::NotFound(format!("transaction {}", id))),
        }
    }

    async fn count_all(&self) -> RepositoryResult<i64> {
        Ok(queries::count_transactions(&self.pool).await?)
    }

    async fn count_not_done(&self) -> RepositoryResult<i64> {
        Ok(queries::count_not_done(&self.pool).await?)
    }

    async fn count_unreconciled(&self) -> RepositoryResult<i64> {
        Ok(queries::count_unreconciled(&self.pool).await?)
    }

    async fn count_rejected(&self) -> RepositoryResult<i64> {
        Ok(queries::count_rejected(&self.pool).await?)
    }

    async fn count_distinct_users(&self) -> RepositoryResult<i64> {
        Ok(queries::count_distinct_users(&self.pool).await?)
    }

    async fn average_processing_seconds(&self) -> RepositoryResult<Option<f64>> {
        Ok(queries::average_processing_seconds(&self.pool).await?)
    }

    async fn distinct_currencies(&self) -> RepositoryResult<Vec<String>> {
        Ok(queries::distinct_currencies(&self.pool).await?)
    }
}
