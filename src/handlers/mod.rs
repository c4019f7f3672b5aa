pub mod dlq;
pub mod statistics;
pub mod transactions;

use crate::health::{DependencyStatus, HealthResponse};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        transactions::create_transaction,
        transactions::list_transactions,
        transactions::get_transaction,
        statistics::get_statistics,
        dlq::list_dlq,
        dlq::get_dlq,
        dlq::requeue_dlq,
        dlq::discard_dlq,
    ),
    components(schemas(
        crate::domain::Transaction,
        crate::domain::TransactionState,
        crate::domain::Statistics,
        crate::domain::DeadLetterReason,
        crate::services::CreateTransactionRequest,
        dlq::DeadLetterResponse,
        HealthResponse,
        DependencyStatus,
    )),
    tags(
        (name = "Transactions", description = "Ingestion and lookup"),
        (name = "Statistics", description = "Aggregate view"),
        (name = "Dead letters", description = "Outcomes that could not be applied"),
        (name = "Health", description = "Dependency checks")
    )
)]
pub struct ApiDoc;

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "A critical dependency is down", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.check().await;

    let status_code = if report.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(report))
}
