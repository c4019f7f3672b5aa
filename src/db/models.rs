//! Row types for SQLx. Converted into domain types by the adapters.

use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{DeadLetter, Transaction};
use crate::ports::RepositoryError;

/// Columns selected for a transaction. `processing_time` is derived and
/// never read back.
pub const TRANSACTION_COLUMNS: &str =
    "id, user_id, amount, currency, status, done, created_at, processed_at";

pub const DEAD_LETTER_COLUMNS: &str = "id, transaction_id, source_topic, source_partition, \
     source_offset, message_key, payload, reason, error, attempts, dead_lettered_at";

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = RepositoryError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Corrupt(format!("transaction {}: {}", row.id, e)))?;

        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            currency: row.currency,
            status,
            done: row.done,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct DeadLetterRow {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub message_key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub reason: String,
    pub error: String,
    pub attempts: i32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl TryFrom<DeadLetterRow> for DeadLetter {
    type Error = RepositoryError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        let reason = row
            .reason
            .parse()
            .map_err(|e: String| RepositoryError::Corrupt(format!("dead letter {}: {}", row.id, e)))?;

        Ok(DeadLetter {
            id: row.id,
            transaction_id: row.transaction_id,
            source_topic: row.source_topic,
            source_partition: row.source_partition,
            source_offset: row.source_offset,
            message_key: row.message_key,
            payload: row.payload,
            reason,
            error: row.error,
            attempts: row.attempts,
            dead_lettered_at: row.dead_lettered_at,
        })
    }
}
