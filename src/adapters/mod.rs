pub mod memory;
pub mod postgres_dead_letter_repository;
pub mod postgres_transaction_repository;

pub use memory::{InMemoryDeadLetterStore, InMemoryTransactionStore};
pub use postgres_dead_letter_repository::PostgresDeadLetterRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
