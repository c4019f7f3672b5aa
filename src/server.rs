//! Process wiring for `serve`: HTTP gateway plus the outcome consumer,
//! sharing one cancellation signal.

use anyhow::Context;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::adapters::{PostgresDeadLetterRepository, PostgresTransactionRepository};
use crate::config::Config;
use crate::health::{HealthService, KafkaChecker, PostgresChecker};
use crate::messaging::{provision_topics, KafkaMessageSource, KafkaProducer, KafkaPublisher};
use crate::ports::{DeadLetterStore, TransactionStore};
use crate::services::{
    ConsumerError, DeadLetterService, OutcomeConsumer, Reconciler, StatisticsService, StoreReconciler,
    TransactionService,
};
use crate::telemetry::component_span;
use crate::{create_app, db, AppState};

const KAFKA_HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Services shared by the HTTP handlers and the CLI.
pub struct Components {
    pub state: AppState,
    pub reconciler: Arc<dyn Reconciler>,
    pub dead_letter_store: Arc<dyn DeadLetterStore>,
}

pub fn build_components(config: &Config, pool: PgPool, producer: KafkaProducer) -> Components {
    let store: Arc<dyn TransactionStore> = Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let dead_letter_store: Arc<dyn DeadLetterStore> = Arc::new(PostgresDeadLetterRepository::new(pool.clone()));

    let publisher = Arc::new(KafkaPublisher::new(
        producer.clone(),
        config.kafka.created_topic.clone(),
        component_span("publisher"),
    ));
    let reconciler: Arc<dyn Reconciler> = Arc::new(StoreReconciler::new(store.clone(), component_span("reconciler")));

    let health = HealthService::new()
        .with_checker("postgres", true, Arc::new(PostgresChecker::new(pool)))
        .with_checker("kafka", false, Arc::new(KafkaChecker::new(producer, KAFKA_HEALTH_TIMEOUT)));

    let state = AppState {
        transactions: TransactionService::new(store.clone(), publisher, component_span("ingestion")),
        statistics: StatisticsService::new(store),
        dead_letters: DeadLetterService::new(
            dead_letter_store.clone(),
            reconciler.clone(),
            component_span("dead_letters"),
        ),
        health: Arc::new(health),
    };

    Components {
        state,
        reconciler,
        dead_letter_store,
    }
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config)
        .await
        .context("Failed to connect to database")?;
    db::bootstrap_schema(&pool).await?;

    provision_topics(&config.kafka)
        .await
        .context("Failed to provision Kafka topics")?;

    let producer = KafkaProducer::new(&config.kafka.brokers, config.kafka.publish_timeout)?;
    let components = build_components(&config, pool, producer);

    match components.state.transactions.unpublished().await {
        Ok(stale) if !stale.is_empty() => tracing::warn!(
            count = stale.len(),
            "Transactions were stored but never published; re-drive them with `tx republish`"
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not check for unpublished transactions"),
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);

    let source = KafkaMessageSource::subscribe(
        &config.kafka.brokers,
        &config.kafka.consumer_group,
        &config.kafka.outcome_topic,
        &config.kafka.auto_offset_reset,
    )?;
    let consumer = OutcomeConsumer::new(
        source,
        components.reconciler,
        components.dead_letter_store,
        config.retry.clone(),
        cancel_rx.clone(),
        component_span("consumer"),
    );
    let mut consumer_task = tokio::spawn(consumer.run());

    let app = create_app(components.state, config.cors_allowed_origins.as_deref());
    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr()))?;

    let mut shutdown_rx = cancel_rx;
    let server = axum::Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {}", addr))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|cancelled| *cancelled).await;
        });
    tracing::info!(addr = %addr, "Listening");
    let mut server_task = tokio::spawn(server);

    let consumer_result = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            None
        }
        result = &mut consumer_task => Some(result),
        result = &mut server_task => {
            let _ = cancel_tx.send(true);
            result.context("HTTP server task failed")??;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
    };

    let _ = cancel_tx.send(true);
    server_task.await.context("HTTP server task failed")??;

    let consumer_result = match consumer_result {
        Some(result) => result,
        None => consumer_task.await,
    };

    match consumer_result.context("Outcome consumer task failed")? {
        Ok(report) => {
            tracing::info!(?report, "Shutdown complete");
            Ok(())
        }
        Err(ConsumerError::Transport(e)) => Err(anyhow::anyhow!(e).context("Outcome consumer stopped")),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
