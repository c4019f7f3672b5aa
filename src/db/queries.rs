use chrono::{DateTime, Utc};
use sqlx::{PgPool, Result};
use uuid::Uuid;

use crate::db::models::{DeadLetterRow, TransactionRow, DEAD_LETTER_COLUMNS, TRANSACTION_COLUMNS};
use crate::domain::{NewDeadLetter, NewTransaction, TransactionState};

// --- Transaction Queries ---

pub async fn insert_transaction(pool: &PgPool, tx: &NewTransaction) -> Result<TransactionRow> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO transactions (user_id, amount, currency, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(&tx.user_id)
    .bind(&tx.amount)
    .bind(&tx.currency)
    .bind(tx.created_at)
    .fetch_one(pool)
    .await
}

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_transactions(pool: &PgPool) -> Result<Vec<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions"
    ))
    .fetch_all(pool)
    .await
}

pub async fn list_transactions_in_state(
    pool: &PgPool,
    state: TransactionState,
) -> Result<Vec<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE status = $1 ORDER BY created_at ASC"
    ))
    .bind(state.as_str())
    .fetch_all(pool)
    .await
}

pub async fn mark_pending(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE transactions SET status = $1 WHERE id = $2 AND status = $3")
        .bind(TransactionState::Pending.as_str())
        .bind(id)
        .bind(TransactionState::Created.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Single-statement reconciliation. Returns `None` when the row is missing
/// or already reconciled.
pub async fn apply_outcome(
    pool: &PgPool,
    id: Uuid,
    done: bool,
    processed_at: DateTime<Utc>,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        UPDATE transactions
        SET done = $1, status = $2, processed_at = $3
        WHERE id = $4 AND processed_at IS NULL
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(done)
    .bind(TransactionState::reconciled(done).as_str())
    .bind(processed_at)
    .bind(id)
    .fetch_optional(pool)
    .await
}

// --- Aggregate Queries ---

pub async fn count_transactions(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(pool)
        .await
}

pub async fn count_not_done(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE done = FALSE")
        .fetch_one(pool)
        .await
}

pub async fn count_unreconciled(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE processed_at IS NULL")
        .fetch_one(pool)
        .await
}

pub async fn count_rejected(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM transactions WHERE processed_at IS NOT NULL AND done = FALSE",
    )
    .fetch_one(pool)
    .await
}

pub async fn count_distinct_users(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM transactions")
        .fetch_one(pool)
        .await
}

pub async fn average_processing_seconds(pool: &PgPool) -> Result<Option<f64>> {
    sqlx::query_scalar(
        r#"
        SELECT AVG(EXTRACT(EPOCH FROM processing_time))::FLOAT8
        FROM transactions
        WHERE processing_time IS NOT NULL
        "#,
    )
    .fetch_one(pool)
    .await
}

pub async fn distinct_currencies(pool: &PgPool) -> Result<Vec<String>> {
    sqlx::query_scalar("SELECT DISTINCT currency FROM transactions ORDER BY currency")
        .fetch_all(pool)
        .await
}

// --- Dead Letter Queries ---

pub async fn insert_dead_letter(pool: &PgPool, entry: &NewDeadLetter) -> Result<DeadLetterRow> {
    sqlx::query_as::<_, DeadLetterRow>(&format!(
        r#"
        INSERT INTO outcome_dead_letters (
            transaction_id, source_topic, source_partition, source_offset,
            message_key, payload, reason, error, attempts
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {DEAD_LETTER_COLUMNS}
        "#
    ))
    .bind(entry.transaction_id)
    .bind(&entry.source_topic)
    .bind(entry.source_partition)
    .bind(entry.source_offset)
    .bind(&entry.message_key)
    .bind(&entry.payload)
    .bind(entry.reason.as_str())
    .bind(&entry.error)
    .bind(entry.attempts)
    .fetch_one(pool)
    .await
}

pub async fn list_dead_letters(pool: &PgPool, limit: i64) -> Result<Vec<DeadLetterRow>> {
    sqlx::query_as::<_, DeadLetterRow>(&format!(
        "SELECT {DEAD_LETTER_COLUMNS} FROM outcome_dead_letters ORDER BY dead_lettered_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn get_dead_letter(pool: &PgPool, id: Uuid) -> Result<Option<DeadLetterRow>> {
    sqlx::query_as::<_, DeadLetterRow>(&format!(
        "SELECT {DEAD_LETTER_COLUMNS} FROM outcome_dead_letters WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_dead_letter(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM outcome_dead_letters WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}
