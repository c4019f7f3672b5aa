//! Transaction entity and its lifecycle.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a transaction inside the pipeline.
///
/// `Created` is entered on insert, `Pending` once the created-event has been
/// published, and one of the two terminal states once an outcome event has
/// been reconciled. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Created,
    Pending,
    Completed,
    Failed,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Created => "created",
            TransactionState::Pending => "pending",
            TransactionState::Completed => "completed",
            TransactionState::Failed => "failed",
        }
    }

    /// Terminal state reached by reconciling an outcome with the given flag.
    pub fn reconciled(done: bool) -> Self {
        if done {
            TransactionState::Completed
        } else {
            TransactionState::Failed
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::Failed)
    }

    /// An outcome may overtake the pending mark, so `Created` can jump
    /// straight to a terminal state.
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Created, Pending) | (Created, Completed) | (Created, Failed) | (Pending, Completed) | (Pending, Failed)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(TransactionState::Created),
            "pending" => Ok(TransactionState::Pending),
            "completed" => Ok(TransactionState::Completed),
            "failed" => Ok(TransactionState::Failed),
            other => Err(format!("unknown transaction state '{}'", other)),
        }
    }
}

/// A persisted transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    #[serde(with = "crate::utils::amount")]
    #[schema(value_type = f64)]
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionState,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// `processed_at - created_at`, available once reconciled.
    pub fn processing_duration(&self) -> Option<Duration> {
        self.processed_at.map(|processed| processed - self.created_at)
    }

    pub fn is_reconciled(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// Fields supplied by the caller when creating a transaction. The store
/// assigns `id` and the initial state.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn new(
        user_id: impl Into<String>,
        amount: BigDecimal,
        currency: impl Into<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            currency: currency.into(),
            created_at: created_at.unwrap_or_else(Utc::now),
        }
    }
}
