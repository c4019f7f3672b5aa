//! Kafka adapters built on rdkafka.

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tracing::Instrument;

use super::{InboundMessage, MessageSource, ProvisioningError, PublishError, Publisher, TransportError};
use crate::config::KafkaConfig;
use crate::domain::Transaction;
use crate::events::TransactionEvent;

const ADMIN_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper over a `FutureProducer` that sends keyed byte payloads.
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaProducer {
    pub fn new(brokers: &str, timeout: Duration) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", "all")
            .create()
            .map_err(|e| PublishError::Configuration(format!("Failed to create producer: {e}")))?;

        tracing::info!(brokers = %brokers, timeout_ms = timeout.as_millis() as u64, "Kafka producer created");

        Ok(Self { producer, timeout })
    }

    pub async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(i32, i64), PublishError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| PublishError::Delivery {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    /// Number of brokers reachable through cluster metadata. Blocks the
    /// calling thread for up to `timeout`.
    pub fn broker_count(&self, timeout: Duration) -> Result<usize, KafkaError> {
        let metadata = self.producer.client().fetch_metadata(None, timeout)?;
        Ok(metadata.brokers().len())
    }
}

/// Publishes created-events keyed by transaction id.
pub struct KafkaPublisher {
    producer: KafkaProducer,
    topic: String,
    span: tracing::Span,
}

impl KafkaPublisher {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>, span: tracing::Span) -> Self {
        Self {
            producer,
            topic: topic.into(),
            span,
        }
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, tx: &Transaction) -> Result<(), PublishError> {
        let event = TransactionEvent::from(tx);
        let payload = event.to_payload()?;
        let key = event.key();

        async {
            match self.producer.send(&self.topic, &key, &payload).await {
                Ok((partition, offset)) => {
                    tracing::info!(
                        topic = %self.topic,
                        partition = partition,
                        offset = offset,
                        transaction_id = %tx.id,
                        "Created event published"
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(topic = %self.topic, transaction_id = %tx.id, error = %e, "Failed to publish created event");
                    Err(e)
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }
}

/// Pulls messages from one topic under a consumer group, one at a time.
pub struct KafkaMessageSource {
    consumer: StreamConsumer,
}

impl KafkaMessageSource {
    pub fn subscribe(
        brokers: &str,
        group_id: &str,
        topic: &str,
        auto_offset_reset: &str,
    ) -> Result<Self, TransportError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| TransportError::Configuration(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| TransportError::Configuration(format!("Failed to subscribe to {topic}: {e}")))?;

        tracing::info!(
            topic = %topic,
            consumer_group = %group_id,
            auto_offset_reset = %auto_offset_reset,
            manual_commit = true,
            "Subscribed to topic"
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    return Ok(Some(InboundMessage {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        key: message.key().map(<[u8]>::to_vec),
                        payload: message.payload().map(<[u8]>::to_vec),
                    }))
                }
                // Per-message consumption errors are reported by librdkafka
                // while it keeps reconnecting on its own.
                Err(KafkaError::MessageConsumption(code)) => {
                    tracing::warn!(error = %code, "Transient consumption error");
                }
                Err(e) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), TransportError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| TransportError::Commit(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| TransportError::Commit(e.to_string()))
    }
}

/// Creates the created- and outcome-topics. Topics that already exist are
/// left untouched.
pub async fn provision_topics(config: &KafkaConfig) -> Result<(), ProvisioningError> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .create()
        .map_err(|e| ProvisioningError::Admin(e.to_string()))?;

    let topics: Vec<NewTopic<'_>> = [&config.created_topic, &config.outcome_topic]
        .into_iter()
        .map(|name| {
            NewTopic::new(
                name.as_str(),
                config.partitions,
                TopicReplication::Fixed(config.replication_factor),
            )
        })
        .collect();

    let options = AdminOptions::new().operation_timeout(Some(ADMIN_OPERATION_TIMEOUT));
    let results = admin
        .create_topics(&topics, &options)
        .await
        .map_err(|e| ProvisioningError::Admin(e.to_string()))?;

    for result in results {
        match result {
            Ok(topic) => tracing::info!(
                topic = %topic,
                partitions = config.partitions,
                replication_factor = config.replication_factor,
                "Topic created"
            ),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::info!(topic = %topic, "Topic already exists")
            }
            Err((topic, code)) => {
                return Err(ProvisioningError::Topic {
                    topic,
                    reason: code.to_string(),
                })
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_adapters_are_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<KafkaPublisher>();
        assert_sync::<KafkaPublisher>();
        assert_send::<KafkaMessageSource>();
    }

    #[test]
    fn test_producer_creation_does_not_need_a_live_broker() {
        let producer = KafkaProducer::new("localhost:9092", Duration::from_secs(1));
        assert!(producer.is_ok());
    }
}
