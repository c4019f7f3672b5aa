use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::Transaction;
use crate::events::OutcomeEvent;
use crate::ports::{ApplyResult, RepositoryError, TransactionStore};

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Applied(Transaction),
    /// Redelivery of an outcome for a transaction that is already terminal.
    AlreadyReconciled(Transaction),
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error("store error: {0}")]
    Store(#[source] RepositoryError),
}

impl ReconcileError {
    /// Only store failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Store(_))
    }
}

impl From<RepositoryError> for ReconcileError {
    fn from(err: RepositoryError) -> Self {
        ReconcileError::Store(err)
    }
}

#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, outcome: &OutcomeEvent) -> Result<ReconcileOutcome, ReconcileError>;
}

/// Applies outcomes to a [`TransactionStore`] in a single write,
/// stamping `processed_at` with the local clock.
pub struct StoreReconciler {
    store: Arc<dyn TransactionStore>,
    span: tracing::Span,
}

impl StoreReconciler {
    pub fn new(store: Arc<dyn TransactionStore>, span: tracing::Span) -> Self {
        Self { store, span }
    }
}

#[async_trait]
impl Reconciler for StoreReconciler {
    async fn reconcile(&self, outcome: &OutcomeEvent) -> Result<ReconcileOutcome, ReconcileError> {
        async {
            let processed_at = Utc::now();
            match self.store.apply_outcome(outcome.id, outcome.done, processed_at).await {
                Ok(ApplyResult::Applied(tx)) => {
                    tracing::info!(
                        transaction_id = %tx.id,
                        done = tx.done,
                        status = %tx.status,
                        "Outcome applied"
                    );
                    Ok(ReconcileOutcome::Applied(tx))
                }
                Ok(ApplyResult::AlreadyReconciled(tx)) => {
                    if tx.done != outcome.done {
                        tracing::warn!(
                            transaction_id = %tx.id,
                            recorded_done = tx.done,
                            incoming_done = outcome.done,
                            "Conflicting outcome for reconciled transaction ignored"
                        );
                    } else {
                        tracing::debug!(transaction_id = %tx.id, "Duplicate outcome ignored");
                    }
                    Ok(ReconcileOutcome::AlreadyReconciled(tx))
                }
                Err(RepositoryError::NotFound(_)) => Err(ReconcileError::NotFound(outcome.id)),
                Err(e) => Err(ReconcileError::Store(e)),
            }
        }
        .instrument(self.span.clone())
        .await
    }
}
