use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{DeadLetter, DeadLetterReason};
use crate::error::AppError;
use crate::services::ReconcileOutcome;
use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    /// Maximum entries to return (default 100).
    pub limit: Option<i64>,
}

/// A dead letter as shown to operators. The payload is rendered as text.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeadLetterResponse {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub message_key: Option<String>,
    pub payload: Option<String>,
    pub reason: DeadLetterReason,
    pub error: String,
    pub attempts: i32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl From<DeadLetter> for DeadLetterResponse {
    fn from(entry: DeadLetter) -> Self {
        Self {
            id: entry.id,
            transaction_id: entry.transaction_id,
            source_topic: entry.source_topic,
            source_partition: entry.source_partition,
            source_offset: entry.source_offset,
            message_key: entry.message_key,
            payload: entry
                .payload
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            reason: entry.reason,
            error: entry.error,
            attempts: entry.attempts,
            dead_lettered_at: entry.dead_lettered_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/dlq",
    params(ListParams),
    responses((status = 200, description = "Dead letters, newest first")),
    tag = "Dead letters"
)]
pub async fn list_dlq(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    let entries: Vec<DeadLetterResponse> = state
        .dead_letters
        .list(params.limit)
        .await?
        .into_iter()
        .map(DeadLetterResponse::from)
        .collect();

    Ok(Json(json!({
        "count": entries.len(),
        "dlq_entries": entries,
    })))
}

#[utoipa::path(
    get,
    path = "/dlq/{id}",
    params(("id" = Uuid, Path, description = "Dead letter id")),
    responses(
        (status = 200, description = "The dead letter", body = DeadLetterResponse),
        (status = 404, description = "No such dead letter")
    ),
    tag = "Dead letters"
)]
pub async fn get_dlq(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeadLetterResponse>, AppError> {
    Ok(Json(state.dead_letters.get(id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/dlq/{id}/requeue",
    params(("id" = Uuid, Path, description = "Dead letter id")),
    responses(
        (status = 200, description = "Outcome applied and entry removed"),
        (status = 404, description = "No such dead letter"),
        (status = 409, description = "Entry still cannot be applied; it is kept")
    ),
    tag = "Dead letters"
)]
pub async fn requeue_dlq(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.dead_letters.requeue(id).await?;
    let (tx, duplicate) = match outcome {
        ReconcileOutcome::Applied(tx) => (tx, false),
        ReconcileOutcome::AlreadyReconciled(tx) => (tx, true),
    };

    Ok(Json(json!({
        "message": "DLQ entry requeued successfully",
        "dlq_id": id,
        "transaction_id": tx.id,
        "status": tx.status,
        "duplicate": duplicate,
    })))
}

#[utoipa::path(
    delete,
    path = "/dlq/{id}",
    params(("id" = Uuid, Path, description = "Dead letter id")),
    responses(
        (status = 204, description = "Entry discarded"),
        (status = 404, description = "No such dead letter")
    ),
    tag = "Dead letters"
)]
pub async fn discard_dlq(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.dead_letters.discard(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
