use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Point-in-time summary of the transaction table.
///
/// The sub-aggregates are read independently, so under concurrent writes
/// they may describe slightly different instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Statistics {
    pub total_transactions: i64,
    /// Every transaction with `done = false`, in flight or rejected. Kept for
    /// clients of the boolean wire model.
    pub failed_transactions: i64,
    /// Not yet reconciled.
    pub pending_transactions: i64,
    /// Reconciled with a negative outcome.
    pub rejected_transactions: i64,
    pub total_users: i64,
    /// Mean of `processed_at - created_at` in seconds over reconciled rows.
    pub average_processing_time: Option<f64>,
    pub currencies: Vec<String>,
}
