pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod handlers;
pub mod health;
pub mod messaging;
pub mod middleware;
pub mod ports;
pub mod server;
pub mod services;
pub mod simulator;
pub mod startup;
pub mod telemetry;
pub mod utils;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::health::HealthService;
use crate::services::{DeadLetterService, StatisticsService, TransactionService};

#[derive(Clone)]
pub struct AppState {
    pub transactions: TransactionService,
    pub statistics: StatisticsService,
    pub dead_letters: DeadLetterService,
    pub health: Arc<HealthService>,
}

pub fn create_app(state: AppState, cors_allowed_origins: Option<&[String]>) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health))
        .route("/transaction", post(handlers::transactions::create_transaction))
        .route("/transactions", get(handlers::transactions::list_transactions))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route("/statistics", get(handlers::statistics::get_statistics))
        .route("/dlq", get(handlers::dlq::list_dlq))
        .route(
            "/dlq/:id",
            get(handlers::dlq::get_dlq).delete(handlers::dlq::discard_dlq),
        )
        .route("/dlq/:id/requeue", post(handlers::dlq::requeue_dlq))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .layer(axum::middleware::from_fn(middleware::request_logger_middleware))
        .with_state(state);

    match cors_allowed_origins {
        Some(origins) => router.layer(cors_layer(origins)),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .expose_headers([axum::http::header::LOCATION])
}
