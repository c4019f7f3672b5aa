use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{NewTransaction, Transaction, TransactionState};
use crate::messaging::{PublishError, Publisher};
use crate::ports::{RepositoryError, TransactionStore};
use crate::validation::{
    sanitize_string, validate_amount, validate_currency, validate_user_id, ValidationError,
};

/// Body of `POST /transaction`. Missing fields deserialize to empty values
/// so they fail validation instead of JSON decoding.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "zero_amount", with = "crate::utils::amount")]
    #[schema(value_type = f64)]
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: String,
    /// Creation time; the server clock is used when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn zero_amount() -> BigDecimal {
    BigDecimal::from(0)
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error("failed to persist transaction: {0}")]
    Persistence(#[source] RepositoryError),

    /// The record exists in the `created` state but never reached the
    /// broker. `republish` is the way back into the pipeline.
    #[error("transaction {id} was stored but its event was not published: {source}")]
    Publish {
        id: Uuid,
        #[source]
        source: PublishError,
    },

    #[error("transaction {id} is {state} and cannot be republished")]
    NotRepublishable { id: Uuid, state: TransactionState },
}

impl IngestError {
    fn from_lookup(id: Uuid, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => IngestError::NotFound(id),
            other => IngestError::Persistence(other),
        }
    }
}

/// Validates, persists and publishes new transactions.
#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn TransactionStore>,
    publisher: Arc<dyn Publisher>,
    span: tracing::Span,
}

impl TransactionService {
    pub fn new(store: Arc<dyn TransactionStore>, publisher: Arc<dyn Publisher>, span: tracing::Span) -> Self {
        Self { store, publisher, span }
    }

    /// Returns only once the record is stored and its created-event is
    /// published.
    pub async fn create(&self, request: CreateTransactionRequest) -> Result<Transaction, IngestError> {
        let user_id = sanitize_string(&request.user_id);
        let currency = sanitize_string(&request.currency);
        validate_user_id(&user_id)?;
        validate_currency(&currency)?;
        validate_amount(&request.amount)?;

        let new = NewTransaction::new(user_id, request.amount, currency, request.timestamp);

        async {
            let tx = self.store.create(&new).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to persist transaction");
                IngestError::Persistence(e)
            })?;

            self.publish_and_mark(tx).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Publishes the created-event of a transaction stuck in `created`.
    pub async fn republish(&self, id: Uuid) -> Result<Transaction, IngestError> {
        async {
            let tx = self
                .store
                .get(id)
                .await
                .map_err(|e| IngestError::from_lookup(id, e))?;

            if tx.status != TransactionState::Created {
                return Err(IngestError::NotRepublishable { id, state: tx.status });
            }

            tracing::info!(transaction_id = %id, "Republishing created event");
            self.publish_and_mark(tx).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Transactions whose created-event was never published, oldest first.
    pub async fn unpublished(&self) -> Result<Vec<Transaction>, IngestError> {
        self.store.list_unpublished().await.map_err(IngestError::Persistence)
    }

    pub async fn get(&self, id: Uuid) -> Result<Transaction, IngestError> {
        self.store
            .get(id)
            .await
            .map_err(|e| IngestError::from_lookup(id, e))
    }

    pub async fn list(&self) -> Result<Vec<Transaction>, IngestError> {
        self.store.list().await.map_err(IngestError::Persistence)
    }

    async fn publish_and_mark(&self, mut tx: Transaction) -> Result<Transaction, IngestError> {
        if let Err(source) = self.publisher.publish(&tx).await {
            tracing::error!(
                transaction_id = %tx.id,
                error = %source,
                "Transaction stored but not published"
            );
            return Err(IngestError::Publish { id: tx.id, source });
        }

        // The event is out, so the request succeeds even if the state
        // bookkeeping below fails.
        match self.store.mark_pending(tx.id).await {
            Ok(true) => tx.status = TransactionState::Pending,
            Ok(false) => {
                tracing::debug!(transaction_id = %tx.id, "Transaction left created before pending mark")
            }
            Err(e) => {
                tracing::warn!(transaction_id = %tx.id, error = %e, "Failed to mark transaction pending")
            }
        }

        tracing::info!(
            transaction_id = %tx.id,
            user_id = %tx.user_id,
            currency = %tx.currency,
            "Transaction accepted"
        );
        Ok(tx)
    }
}
