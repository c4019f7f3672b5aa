use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::domain::Transaction;
use crate::error::AppError;
use crate::services::CreateTransactionRequest;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/transaction",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction stored and its event published", headers(("location" = String))),
        (status = 400, description = "Missing or invalid field"),
        (status = 500, description = "Transaction could not be stored"),
        (status = 502, description = "Transaction stored but the event could not be published")
    ),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let tx = state.transactions.create(request).await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/transactions/{}", tx.id))],
    ))
}

#[utoipa::path(
    get,
    path = "/transactions",
    responses(
        (status = 200, description = "Every stored transaction, unordered", body = [Transaction])
    ),
    tag = "Transactions"
)]
pub async fn list_transactions(State(state): State<AppState>) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.transactions.list().await?))
}

#[utoipa::path(
    get,
    path = "/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "The transaction", body = Transaction),
        (status = 404, description = "No such transaction")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(state.transactions.get(id).await?))
}
