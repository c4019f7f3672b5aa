//! Broker-facing capabilities: publishing created-events and pulling
//! outcome messages.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Transaction;

pub mod kafka;
pub mod memory;

pub use kafka::{provision_topics, KafkaMessageSource, KafkaProducer, KafkaPublisher};
pub use memory::{CommitLog, InMemoryMessageSource, InMemoryPublisher, MessageFeed};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to deliver to topic {topic}: {reason}")]
    Delivery { topic: String, reason: String },

    #[error("producer configuration error: {0}")]
    Configuration(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to receive message: {0}")]
    Receive(String),

    #[error("failed to commit offset: {0}")]
    Commit(String),

    #[error("consumer configuration error: {0}")]
    Configuration(String),
}

#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("admin client error: {0}")]
    Admin(String),

    #[error("failed to create topic {topic}: {reason}")]
    Topic { topic: String, reason: String },
}

/// A message pulled from the broker, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn key_str(&self) -> Option<String> {
        self.key
            .as_deref()
            .map(|k| String::from_utf8_lossy(k).into_owned())
    }
}

/// Publishes the created-event of a freshly persisted transaction.
///
/// Delivery is at-least-once. Implementations neither deduplicate nor retry;
/// a failure is returned to the caller as is.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, tx: &Transaction) -> Result<(), PublishError>;
}

/// Sequential pull interface over a topic subscription.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next message. `Ok(None)` means the source is exhausted
    /// and will never yield again.
    async fn next_message(&mut self) -> Result<Option<InboundMessage>, TransportError>;

    /// Marks the message as handled so it is not delivered to the group again.
    async fn commit(&mut self, message: &InboundMessage) -> Result<(), TransportError>;
}
