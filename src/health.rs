use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::messaging::KafkaProducer;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl HealthResponse {
    pub fn is_unhealthy(&self) -> bool {
        self.status == "unhealthy"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Fetches cluster metadata through the producer's client.
pub struct KafkaChecker {
    producer: KafkaProducer,
    metadata_timeout: Duration,
}

impl KafkaChecker {
    pub fn new(producer: KafkaProducer, metadata_timeout: Duration) -> Self {
        Self {
            producer,
            metadata_timeout,
        }
    }
}

#[async_trait]
impl DependencyChecker for KafkaChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        let producer = self.producer.clone();
        let metadata_timeout = self.metadata_timeout;

        // librdkafka's metadata call blocks the calling thread.
        match tokio::task::spawn_blocking(move || producer.broker_count(metadata_timeout)).await {
            Ok(Ok(0)) => DependencyStatus::unhealthy("no brokers in cluster metadata"),
            Ok(Ok(_)) => DependencyStatus::healthy(start),
            Ok(Err(e)) => DependencyStatus::unhealthy(e.to_string()),
            Err(e) => DependencyStatus::unhealthy(format!("metadata task failed: {}", e)),
        }
    }
}

struct RegisteredChecker {
    name: &'static str,
    critical: bool,
    checker: Arc<dyn DependencyChecker>,
}

/// Runs every registered check concurrently, each under its own timeout.
/// A failing critical dependency makes the service `unhealthy`; any other
/// failure only makes it `degraded`.
pub struct HealthService {
    checkers: Vec<RegisteredChecker>,
    start_time: Instant,
}

impl HealthService {
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn with_checker(mut self, name: &'static str, critical: bool, checker: Arc<dyn DependencyChecker>) -> Self {
        self.checkers.push(RegisteredChecker { name, critical, checker });
        self
    }

    pub async fn check(&self) -> HealthResponse {
        let results = join_all(self.checkers.iter().map(|registered| async move {
            let status = timeout(CHECK_TIMEOUT, registered.checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
            (registered, status)
        }))
        .await;

        let mut dependencies = HashMap::new();
        let mut has_critical_failure = false;
        let mut has_non_critical_failure = false;

        for (registered, status) in results {
            if matches!(status, DependencyStatus::Unhealthy { .. }) {
                if registered.critical {
                    has_critical_failure = true;
                } else {
                    has_non_critical_failure = true;
                }
            }
            dependencies.insert(registered.name.to_string(), status);
        }

        let status = if has_critical_failure {
            "unhealthy"
        } else if has_non_critical_failure {
            "degraded"
        } else {
            "healthy"
        };

        HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            dependencies,
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}
