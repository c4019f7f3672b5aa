use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;
use crate::services::{DeadLetterError, IngestError, QueryError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A downstream system (the broker) refused the work.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(e) => AppError::Validation(e.to_string()),
            IngestError::NotFound(id) => AppError::NotFound(format!("transaction {}", id)),
            IngestError::Persistence(e) => AppError::Database(e),
            e @ IngestError::Publish { .. } => AppError::Upstream(e.to_string()),
            e @ IngestError::NotRepublishable { .. } => AppError::Conflict(e.to_string()),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<DeadLetterError> for AppError {
    fn from(err: DeadLetterError) -> Self {
        match err {
            DeadLetterError::NotFound(id) => AppError::NotFound(format!("dead letter {}", id)),
            DeadLetterError::Store(e) => AppError::Database(e),
            e @ DeadLetterError::Undecodable { .. } => AppError::Conflict(e.to_string()),
            e @ DeadLetterError::Reconcile { .. } => AppError::Conflict(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::PublishError;
    use crate::validation::ValidationError;
    use uuid::Uuid;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Resource not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_ingest_errors_map_to_statuses() {
        let validation: AppError = IngestError::Validation(ValidationError::new("amount", "must not be zero")).into();
        assert_eq!(validation.status_code(), StatusCode::BAD_REQUEST);

        let publish: AppError = IngestError::Publish {
            id: Uuid::new_v4(),
            source: PublishError::Delivery {
                topic: "new_transactions".to_string(),
                reason: "timed out".to_string(),
            },
        }
        .into();
        assert_eq!(publish.status_code(), StatusCode::BAD_GATEWAY);

        let persistence: AppError = IngestError::Persistence(RepositoryError::Unavailable("down".to_string())).into();
        assert_eq!(persistence.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_dead_letter_errors_map_to_statuses() {
        let missing: AppError = DeadLetterError::NotFound(Uuid::new_v4()).into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_error_response() {
        let error = AppError::Validation("user_id: must not be empty".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upstream_error_response() {
        let error = AppError::Upstream("broker unavailable".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
