use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::DeadLetter;
use crate::events::{ConsumeError, OutcomeEvent};
use crate::ports::{DeadLetterStore, RepositoryError};
use crate::services::reconciler::{ReconcileError, ReconcileOutcome, Reconciler};

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 1000;

#[derive(Error, Debug)]
pub enum DeadLetterError {
    #[error("dead letter {0} not found")]
    NotFound(Uuid),

    #[error("dead letter store error: {0}")]
    Store(#[source] RepositoryError),

    #[error("dead letter {id} still cannot be decoded: {source}")]
    Undecodable {
        id: Uuid,
        #[source]
        source: ConsumeError,
    },

    #[error("dead letter {id} could not be reconciled: {source}")]
    Reconcile {
        id: Uuid,
        #[source]
        source: ReconcileError,
    },
}

impl DeadLetterError {
    fn from_lookup(id: Uuid, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => DeadLetterError::NotFound(id),
            other => DeadLetterError::Store(other),
        }
    }
}

/// Operator actions on the persisted failure queue.
#[derive(Clone)]
pub struct DeadLetterService {
    store: Arc<dyn DeadLetterStore>,
    reconciler: Arc<dyn Reconciler>,
    span: tracing::Span,
}

impl DeadLetterService {
    pub fn new(store: Arc<dyn DeadLetterStore>, reconciler: Arc<dyn Reconciler>, span: tracing::Span) -> Self {
        Self { store, reconciler, span }
    }

    /// Newest first. `limit` is clamped to `1..=MAX_LIST_LIMIT`.
    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<DeadLetter>, DeadLetterError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.store.list(limit).await.map_err(DeadLetterError::Store)
    }

    pub async fn get(&self, id: Uuid) -> Result<DeadLetter, DeadLetterError> {
        self.store
            .get(id)
            .await
            .map_err(|e| DeadLetterError::from_lookup(id, e))
    }

    /// Replays the stored message through the reconciler and drops the
    /// entry once it has been applied (or found to be a duplicate). On any
    /// failure the entry stays in place.
    pub async fn requeue(&self, id: Uuid) -> Result<ReconcileOutcome, DeadLetterError> {
        async {
            let entry = self.get(id).await?;

            let key = entry.message_key.as_deref().map(str::as_bytes);
            let event = OutcomeEvent::decode(key, entry.payload.as_deref())
                .map_err(|source| DeadLetterError::Undecodable { id, source })?;

            let outcome = self
                .reconciler
                .reconcile(&event)
                .await
                .map_err(|source| DeadLetterError::Reconcile { id, source })?;

            self.store.remove(id).await.map_err(DeadLetterError::Store)?;
            tracing::info!(
                dead_letter_id = %id,
                transaction_id = %event.id,
                duplicate = matches!(outcome, ReconcileOutcome::AlreadyReconciled(_)),
                "Dead letter requeued"
            );
            Ok(outcome)
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn discard(&self, id: Uuid) -> Result<(), DeadLetterError> {
        let removed = self.store.remove(id).await.map_err(DeadLetterError::Store)?;
        if !removed {
            return Err(DeadLetterError::NotFound(id));
        }
        tracing::info!(parent: &self.span, dead_letter_id = %id, "Dead letter discarded");
        Ok(())
    }
}
