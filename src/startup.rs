use crate::config::Config;
use crate::messaging::KafkaProducer;
use anyhow::{Context, Result};
use std::time::Duration;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub kafka: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.kafka
    }

    pub fn print(&self) {
        println!("\nConnectivity check");
        for (name, ok) in [
            ("environment", self.environment),
            ("postgres", self.database),
            ("kafka", self.kafka),
        ] {
            println!("  {:<12} {}", name, if ok { "✓ ok" } else { "✗ failed" });
        }

        for error in &self.errors {
            println!("  - {}", error);
        }

        let verdict = if self.is_valid() { "ready" } else { "not ready" };
        println!("Result: {}\n", verdict);
    }
}

pub async fn validate_environment(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        kafka: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if let Err(e) = validate_database(config).await {
        report.database = false;
        report.errors.push(format!("Database: {:#}", e));
    }

    if let Err(e) = validate_kafka(config).await {
        report.kafka = false;
        report.errors.push(format!("Kafka: {:#}", e));
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.kafka.brokers.trim().is_empty() {
        anyhow::bail!("KAFKA_BROKERS is empty");
    }
    if config.kafka.created_topic == config.kafka.outcome_topic {
        anyhow::bail!("KAFKA_CREATED_TOPIC and KAFKA_OUTCOME_TOPIC must differ");
    }
    if config.kafka.partitions < 1 {
        anyhow::bail!("KAFKA_TOPIC_PARTITIONS must be at least 1");
    }
    if config.kafka.replication_factor < 1 {
        anyhow::bail!("KAFKA_REPLICATION_FACTOR must be at least 1");
    }
    if !matches!(config.kafka.auto_offset_reset.as_str(), "earliest" | "latest") {
        anyhow::bail!("KAFKA_AUTO_OFFSET_RESET must be 'earliest' or 'latest'");
    }

    url::Url::parse(&config.database_url).context("DATABASE_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(config: &Config) -> Result<()> {
    let pool = crate::db::create_pool(config)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .context("Database did not answer SELECT 1")?;

    Ok(())
}

async fn validate_kafka(config: &Config) -> Result<()> {
    let producer = KafkaProducer::new(&config.kafka.brokers, config.kafka.publish_timeout)
        .context("Failed to create Kafka client")?;

    let brokers = tokio::task::spawn_blocking(move || producer.broker_count(METADATA_TIMEOUT))
        .await
        .context("Metadata task failed")?
        .context("Failed to fetch cluster metadata")?;

    if brokers == 0 {
        anyhow::bail!("cluster metadata lists no brokers");
    }

    Ok(())
}
