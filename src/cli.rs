use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::Config;
use crate::messaging::{provision_topics, KafkaMessageSource, KafkaProducer};
use crate::server::{build_components, Components};
use crate::services::ReconcileOutcome;
use crate::simulator::{Simulator, SimulatorSettings, PROCESSOR_GROUP};

#[derive(Parser)]
#[command(name = "transacti-stream")]
#[command(about = "TransactiStream - event-driven transaction pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway and the outcome consumer (default)
    Serve,

    /// Create the Kafka topics if they do not exist
    Provision,

    /// Configuration and connectivity validation
    Config,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Dead-letter queue commands
    #[command(subcommand)]
    Dlq(DlqCommands),

    /// Run a stand-in external processor against the broker
    Simulate {
        /// Probability that an outcome is negative
        #[arg(long, default_value_t = 0.2)]
        failure_rate: f64,

        #[arg(long, default_value_t = 1)]
        min_delay_secs: u64,

        #[arg(long, default_value_t = 5)]
        max_delay_secs: u64,
    },
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// List transactions whose created-event was never published
    Unpublished,

    /// Publish the created-event of a transaction still in `created`
    Republish {
        /// Transaction UUID
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum DlqCommands {
    /// List dead letters, newest first
    List {
        #[arg(short, long, default_value_t = 100)]
        limit: i64,
    },

    /// Apply a dead letter again and drop it on success
    Requeue {
        #[arg(value_name = "DLQ_ID")]
        id: Uuid,
    },

    /// Drop a dead letter without applying it
    Discard {
        #[arg(value_name = "DLQ_ID")]
        id: Uuid,
    },
}

async fn connect(config: &Config) -> anyhow::Result<Components> {
    let pool = crate::db::create_pool(config).await?;
    let producer = KafkaProducer::new(&config.kafka.brokers, config.kafka.publish_timeout)?;
    Ok(build_components(config, pool, producer))
}

pub async fn handle_provision(config: &Config) -> anyhow::Result<()> {
    provision_topics(&config.kafka).await?;
    println!(
        "✓ Topics {} and {} are provisioned",
        config.kafka.created_topic, config.kafka.outcome_topic
    );
    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Listen Address: {}", config.listen_addr());
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Kafka Brokers: {}", config.kafka.brokers);
    println!(
        "  Topics: {} -> {} (group {})",
        config.kafka.created_topic, config.kafka.outcome_topic, config.kafka.consumer_group
    );
    println!(
        "  Reconcile Retry: {} attempts, {:?} initial, {:?} max",
        config.retry.max_attempts, config.retry.initial_backoff, config.retry.max_backoff
    );

    let report = crate::startup::validate_environment(config).await;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }
    Ok(())
}

pub async fn handle_tx_unpublished(config: &Config) -> anyhow::Result<()> {
    let components = connect(config).await?;
    let stale = components.state.transactions.unpublished().await?;

    if stale.is_empty() {
        println!("No unpublished transactions");
        return Ok(());
    }

    println!("{:<38} {:<20} {:>14} {:<8} {:<20}", "ID", "User", "Amount", "Currency", "Created");
    println!("{}", "-".repeat(104));
    for tx in stale {
        println!(
            "{:<38} {:<20} {:>14} {:<8} {:<20}",
            tx.id,
            tx.user_id,
            tx.amount.to_string(),
            tx.currency,
            tx.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn handle_tx_republish(config: &Config, tx_id: Uuid) -> anyhow::Result<()> {
    let components = connect(config).await?;
    let tx = components.state.transactions.republish(tx_id).await?;

    println!("✓ Transaction {} republished ({})", tx.id, tx.status);
    Ok(())
}

pub async fn handle_dlq_list(config: &Config, limit: i64) -> anyhow::Result<()> {
    let components = connect(config).await?;
    let entries = components.state.dead_letters.list(Some(limit)).await?;

    if entries.is_empty() {
        println!("Dead-letter queue is empty");
        return Ok(());
    }

    println!("{:<38} {:<14} {:<38} {:>8} {:<20}", "ID", "Reason", "Transaction", "Offset", "Dead-lettered");
    println!("{}", "-".repeat(122));
    for entry in entries {
        println!(
            "{:<38} {:<14} {:<38} {:>8} {:<20}",
            entry.id,
            entry.reason,
            entry
                .transaction_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.source_offset,
            entry.dead_lettered_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("    {}", entry.error);
    }
    Ok(())
}

pub async fn handle_dlq_requeue(config: &Config, id: Uuid) -> anyhow::Result<()> {
    let components = connect(config).await?;

    match components.state.dead_letters.requeue(id).await? {
        ReconcileOutcome::Applied(tx) => {
            println!("✓ Dead letter {} applied: transaction {} is {}", id, tx.id, tx.status)
        }
        ReconcileOutcome::AlreadyReconciled(tx) => println!(
            "✓ Dead letter {} dropped: transaction {} was already {}",
            id, tx.id, tx.status
        ),
    }
    Ok(())
}

pub async fn handle_dlq_discard(config: &Config, id: Uuid) -> anyhow::Result<()> {
    let components = connect(config).await?;
    components.state.dead_letters.discard(id).await?;

    println!("✓ Dead letter {} discarded", id);
    Ok(())
}

pub async fn handle_simulate(config: &Config, settings: SimulatorSettings) -> anyhow::Result<()> {
    settings.validate()?;

    let source = KafkaMessageSource::subscribe(
        &config.kafka.brokers,
        PROCESSOR_GROUP,
        &config.kafka.created_topic,
        &config.kafka.auto_offset_reset,
    )?;
    let producer = KafkaProducer::new(&config.kafka.brokers, config.kafka.publish_timeout)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    Simulator::new(source, producer, config.kafka.outcome_topic.clone(), settings, cancel_rx)
        .run()
        .await?;
    Ok(())
}

pub fn simulator_settings(failure_rate: f64, min_delay_secs: u64, max_delay_secs: u64) -> SimulatorSettings {
    SimulatorSettings {
        failure_rate,
        min_delay: Duration::from_secs(min_delay_secs),
        max_delay: Duration::from_secs(max_delay_secs),
    }
}

fn mask_password(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_ok() {
                parsed.to_string()
            } else {
                url.to_string()
            }
        }
        _ => url.to_string(),
    }
}
