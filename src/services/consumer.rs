//! The outcome reconciliation loop.
//!
//! Messages are handled strictly one at a time in delivery order, which is
//! what preserves per-key ordering from the partition. Every handled message
//! is committed, whether it was applied, was a duplicate, or ended up in the
//! dead-letter store, so a single bad message never stalls the partition.
//! The one exception is a message whose retry backoff is cut short by
//! shutdown; it stays uncommitted and is redelivered.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{DeadLetterReason, NewDeadLetter};
use crate::events::OutcomeEvent;
use crate::messaging::{InboundMessage, MessageSource, TransportError};
use crate::ports::DeadLetterStore;
use crate::services::reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
use crate::services::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Counters for one run of the loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerReport {
    pub processed: u64,
    pub reconciled: u64,
    pub duplicates: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Reconciled,
    Duplicate,
    DeadLettered,
    /// The dead-letter write itself failed; the message is lost.
    Dropped,
    /// Shutdown arrived during a retry backoff. Left uncommitted so the
    /// group redelivers it.
    Interrupted,
}

pub struct OutcomeConsumer<S: MessageSource> {
    source: S,
    reconciler: Arc<dyn Reconciler>,
    dead_letters: Arc<dyn DeadLetterStore>,
    retry: RetryPolicy,
    cancel: watch::Receiver<bool>,
    span: tracing::Span,
}

impl<S: MessageSource> OutcomeConsumer<S> {
    pub fn new(
        source: S,
        reconciler: Arc<dyn Reconciler>,
        dead_letters: Arc<dyn DeadLetterStore>,
        retry: RetryPolicy,
        cancel: watch::Receiver<bool>,
        span: tracing::Span,
    ) -> Self {
        Self {
            source,
            reconciler,
            dead_letters,
            retry,
            cancel,
            span,
        }
    }

    /// Runs until cancelled, until the source is exhausted, or until the
    /// transport fails. Per-message failures never end the loop.
    pub async fn run(self) -> Result<ConsumerReport, ConsumerError> {
        let span = self.span.clone();
        self.run_loop().instrument(span).await
    }

    async fn run_loop(mut self) -> Result<ConsumerReport, ConsumerError> {
        let mut report = ConsumerReport::default();
        tracing::info!(max_attempts = self.retry.max_attempts, "Outcome consumer started");

        loop {
            if *self.cancel.borrow() {
                tracing::info!(?report, "Outcome consumer cancelled");
                return Ok(report);
            }

            let next = tokio::select! {
                biased;
                changed = self.cancel.changed() => {
                    if changed.is_err() {
                        // Nobody is left to cancel us; treat it as shutdown.
                        tracing::info!(?report, "Cancellation handle dropped, stopping consumer");
                        return Ok(report);
                    }
                    continue;
                }
                next = self.source.next_message() => next,
            };

            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tracing::info!(?report, "Outcome source exhausted");
                    return Ok(report);
                }
                Err(e) => {
                    tracing::error!(error = %e, ?report, "Outcome consumer stopped on transport error");
                    return Err(ConsumerError::Transport(e));
                }
            };

            let message_span = tracing::info_span!(
                "outcome",
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset
            );
            let disposition = self.handle(&message).instrument(message_span).await;
            if disposition == Disposition::Interrupted {
                tracing::info!(offset = message.offset, ?report, "Outcome consumer cancelled during retry");
                return Ok(report);
            }

            report.processed += 1;
            match disposition {
                Disposition::Reconciled => report.reconciled += 1,
                Disposition::Duplicate => report.duplicates += 1,
                Disposition::DeadLettered => report.dead_lettered += 1,
                Disposition::Dropped | Disposition::Interrupted => {}
            }

            if let Err(e) = self.source.commit(&message).await {
                tracing::warn!(offset = message.offset, error = %e, "Offset commit failed");
            }
        }
    }

    async fn handle(&self, message: &InboundMessage) -> Disposition {
        let event = match OutcomeEvent::decode(message.key.as_deref(), message.payload.as_deref()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Poison outcome message");
                let transaction_id = message
                    .key_str()
                    .and_then(|key| Uuid::parse_str(key.trim()).ok());
                return self
                    .dead_letter(message, transaction_id, DeadLetterReason::Malformed, e.to_string(), 0)
                    .await;
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.reconciler.reconcile(&event).await {
                Ok(ReconcileOutcome::Applied(_)) => return Disposition::Reconciled,
                Ok(ReconcileOutcome::AlreadyReconciled(_)) => return Disposition::Duplicate,
                Err(e) if e.is_retryable() && self.retry.should_retry(attempt) => {
                    let backoff = self.retry.backoff_for(attempt);
                    tracing::warn!(
                        transaction_id = %event.id,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Reconcile failed, retrying"
                    );
                    let mut cancel = self.cancel.clone();
                    // A dropped sender counts as shutdown too.
                    let cancelled = async move {
                        let _ = cancel.wait_for(|cancelled| *cancelled).await;
                    };
                    tokio::select! {
                        biased;
                        _ = cancelled => return Disposition::Interrupted,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    let reason = match e {
                        ReconcileError::NotFound(_) => DeadLetterReason::NotFound,
                        ReconcileError::Store(_) => DeadLetterReason::StoreFailure,
                    };
                    tracing::warn!(
                        transaction_id = %event.id,
                        attempts = attempt,
                        reason = %reason,
                        error = %e,
                        "Giving up on outcome"
                    );
                    return self
                        .dead_letter(message, Some(event.id), reason, e.to_string(), attempt as i32)
                        .await;
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        message: &InboundMessage,
        transaction_id: Option<Uuid>,
        reason: DeadLetterReason,
        error: String,
        attempts: i32,
    ) -> Disposition {
        let entry = NewDeadLetter {
            transaction_id,
            source_topic: message.topic.clone(),
            source_partition: message.partition,
            source_offset: message.offset,
            message_key: message.key_str(),
            payload: message.payload.clone(),
            reason,
            error,
            attempts,
        };

        match self.dead_letters.push(entry).await {
            Ok(dead_letter) => {
                tracing::info!(dead_letter_id = %dead_letter.id, reason = %reason, "Outcome dead-lettered");
                Disposition::DeadLettered
            }
            Err(e) => {
                tracing::error!(
                    reason = %reason,
                    error = %e,
                    "Failed to dead-letter outcome, message dropped"
                );
                Disposition::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDeadLetterStore, InMemoryTransactionStore};
    use crate::messaging::InMemoryMessageSource;
    use crate::services::reconciler::StoreReconciler;

    #[tokio::test]
    async fn test_exhausted_source_ends_loop_cleanly() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
        let (source, mut feed) = InMemoryMessageSource::new("processed_transactions");
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        feed.send_raw(None, Some(b"not json".to_vec()));
        drop(feed);

        let consumer = OutcomeConsumer::new(
            source,
            Arc::new(StoreReconciler::new(store, tracing::Span::none())),
            dead_letters.clone(),
            RetryPolicy::immediate(1),
            cancel_rx,
            tracing::Span::none(),
        );

        let report = consumer.run().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(dead_letters.len().await, 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let (source, mut feed) = InMemoryMessageSource::new("processed_transactions");
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        feed.send_error(TransportError::Receive("broker gone".to_string()));

        let consumer = OutcomeConsumer::new(
            source,
            Arc::new(StoreReconciler::new(store, tracing::Span::none())),
            Arc::new(InMemoryDeadLetterStore::new()),
            RetryPolicy::immediate(1),
            cancel_rx,
            tracing::Span::none(),
        );

        let err = consumer.run().await.unwrap_err();
        assert!(matches!(err, ConsumerError::Transport(TransportError::Receive(_))));
    }
}
