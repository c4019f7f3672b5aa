//! Framework-agnostic domain types for the transaction pipeline.

pub mod dead_letter;
pub mod statistics;
pub mod transaction;

pub use dead_letter::{DeadLetter, DeadLetterReason, NewDeadLetter};
pub use statistics::Statistics;
pub use transaction::{NewTransaction, Transaction, TransactionState};
