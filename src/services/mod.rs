pub mod consumer;
pub mod dead_letters;
pub mod ingestion;
pub mod reconciler;
pub mod retry;
pub mod statistics;

pub use consumer::{ConsumerError, ConsumerReport, OutcomeConsumer};
pub use dead_letters::{DeadLetterError, DeadLetterService};
pub use ingestion::{CreateTransactionRequest, IngestError, TransactionService};
pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler, StoreReconciler};
pub use retry::RetryPolicy;
pub use statistics::{QueryError, StatisticsService};
