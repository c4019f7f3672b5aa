//! Postgres implementation of DeadLetterStore.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::domain::{DeadLetter, NewDeadLetter};
use crate::ports::{DeadLetterStore, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresDeadLetterRepository {
    pool: PgPool,
}

impl PostgresDeadLetterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for PostgresDeadLetterRepository {
    async fn push(&self, entry: NewDeadLetter) -> RepositoryResult<DeadLetter> {
        let row = queries::insert_dead_letter(&self.pool, &entry).await?;
        DeadLetter::try_from(row)
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<DeadLetter>> {
        queries::list_dead_letters(&self.pool, limit)
            .await?
            .into_iter()
            .map(DeadLetter::try_from)
            .collect()
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<DeadLetter> {
        queries::get_dead_letter(&self.pool, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("dead letter {}", id)))
            .and_then(DeadLetter::try_from)
    }

    async fn remove(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(queries::delete_dead_letter(&self.pool, id).await?)
    }
}
