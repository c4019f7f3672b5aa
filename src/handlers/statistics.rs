use axum::{extract::State, Json};

use crate::domain::Statistics;
use crate::error::AppError;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/statistics",
    responses(
        (status = 200, description = "Best-effort snapshot of the transaction table", body = Statistics),
        (status = 500, description = "One of the aggregates failed")
    ),
    tag = "Statistics"
)]
pub async fn get_statistics(State(state): State<AppState>) -> Result<Json<Statistics>, AppError> {
    Ok(Json(state.statistics.snapshot().await?))
}
