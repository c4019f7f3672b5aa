//! Storage capabilities the pipeline depends on.
//!
//! Postgres implementations live in `adapters`, as do in-memory fakes used by
//! the pipeline tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{DeadLetter, NewDeadLetter, NewTransaction, Transaction};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of applying an outcome to a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResult {
    /// The transaction moved into its terminal state.
    Applied(Transaction),
    /// The transaction was already reconciled; nothing was written.
    AlreadyReconciled(Transaction),
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a new transaction in the `created` state and returns it with
    /// its store-assigned id.
    async fn create(&self, new: &NewTransaction) -> RepositoryResult<Transaction>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Transaction>;

    /// Every transaction, in no particular order.
    async fn list(&self) -> RepositoryResult<Vec<Transaction>>;

    /// Transactions still waiting for their created-event to be published.
    async fn list_unpublished(&self) -> RepositoryResult<Vec<Transaction>>;

    /// Moves `created` to `pending`. Returns false when the transaction was
    /// in any other state.
    async fn mark_pending(&self, id: Uuid) -> RepositoryResult<bool>;

    /// Sets `done`, the terminal state and `processed_at` in one write, only
    /// if the transaction has not been reconciled yet.
    async fn apply_outcome(
        &self,
        id: Uuid,
        done: bool,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<ApplyResult>;

    async fn count_all(&self) -> RepositoryResult<i64>;

    /// Rows with `done = false`.
    async fn count_not_done(&self) -> RepositoryResult<i64>;

    /// Rows with `processed_at IS NULL`.
    async fn count_unreconciled(&self) -> RepositoryResult<i64>;

    /// Reconciled rows with `done = false`.
    async fn count_rejected(&self) -> RepositoryResult<i64>;

    async fn count_distinct_users(&self) -> RepositoryResult<i64>;

    /// Mean processing time in seconds over reconciled rows, `None` when
    /// there are none.
    async fn average_processing_seconds(&self) -> RepositoryResult<Option<f64>>;

    /// Distinct currencies, sorted.
    async fn distinct_currencies(&self) -> RepositoryResult<Vec<String>>;
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn push(&self, entry: NewDeadLetter) -> RepositoryResult<DeadLetter>;

    /// Newest first.
    async fn list(&self, limit: i64) -> RepositoryResult<Vec<DeadLetter>>;

    async fn get(&self, id: Uuid) -> RepositoryResult<DeadLetter>;

    /// Returns false if nothing was removed.
    async fn remove(&self, id: Uuid) -> RepositoryResult<bool>;
}
