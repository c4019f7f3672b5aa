//! In-memory broker stand-ins for exercising the pipeline without Kafka.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::{InboundMessage, MessageSource, PublishError, Publisher, TransportError};
use crate::domain::Transaction;
use crate::events::TransactionEvent;

/// Records every created-event and can be told to fail.
#[derive(Default)]
pub struct InMemoryPublisher {
    published: RwLock<Vec<TransactionEvent>>,
    failing: AtomicBool,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<TransactionEvent> {
        self.published.read().await.clone()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, tx: &Transaction) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Delivery {
                topic: "in-memory".to_string(),
                reason: "publisher switched off".to_string(),
            });
        }
        self.published.write().await.push(TransactionEvent::from(tx));
        Ok(())
    }
}

/// Shared record of committed offsets that outlives the feed.
#[derive(Clone, Default)]
pub struct CommitLog(Arc<Mutex<Vec<i64>>>);

impl CommitLog {
    /// Offsets committed so far, in commit order.
    pub fn offsets(&self) -> Vec<i64> {
        self.0.lock().map(|offsets| offsets.clone()).unwrap_or_default()
    }

    fn push(&self, offset: i64) -> Result<(), TransportError> {
        self.0
            .lock()
            .map_err(|e| TransportError::Commit(e.to_string()))?
            .push(offset);
        Ok(())
    }
}

/// Producer side of an [`InMemoryMessageSource`]. Assigns consecutive
/// offsets on a single partition; dropping it ends the stream.
pub struct MessageFeed {
    topic: String,
    next_offset: i64,
    sender: mpsc::UnboundedSender<Result<InboundMessage, TransportError>>,
    committed: CommitLog,
}

impl MessageFeed {
    /// Queues an outcome for `id`, keyed by the id like a real processor.
    pub fn send_outcome(&mut self, id: Uuid, done: bool) -> i64 {
        let payload = serde_json::json!({ "id": id, "done": done }).to_string();
        self.send_raw(Some(id.to_string().into_bytes()), Some(payload.into_bytes()))
    }

    pub fn send_raw(&mut self, key: Option<Vec<u8>>, payload: Option<Vec<u8>>) -> i64 {
        let offset = self.next_offset;
        self.next_offset += 1;
        let _ = self.sender.send(Ok(InboundMessage {
            topic: self.topic.clone(),
            partition: 0,
            offset,
            key,
            payload,
        }));
        offset
    }

    /// Makes the source return `error` once it reaches this point.
    pub fn send_error(&mut self, error: TransportError) {
        let _ = self.sender.send(Err(error));
    }

    pub fn committed(&self) -> Vec<i64> {
        self.committed.offsets()
    }

    pub fn commit_log(&self) -> CommitLog {
        self.committed.clone()
    }
}

pub struct InMemoryMessageSource {
    receiver: mpsc::UnboundedReceiver<Result<InboundMessage, TransportError>>,
    committed: CommitLog,
}

impl InMemoryMessageSource {
    pub fn new(topic: impl Into<String>) -> (Self, MessageFeed) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let committed = CommitLog::default();
        let feed = MessageFeed {
            topic: topic.into(),
            next_offset: 0,
            sender,
            committed: committed.clone(),
        };
        (Self { receiver, committed }, feed)
    }
}

#[async_trait]
impl MessageSource for InMemoryMessageSource {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        match self.receiver.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), TransportError> {
        self.committed.push(message.offset)
    }
}
