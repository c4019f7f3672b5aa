use std::sync::Arc;
use thiserror::Error;

use crate::domain::Statistics;
use crate::ports::{RepositoryError, TransactionStore};

#[derive(Error, Debug)]
#[error("failed to compute {aggregate}: {source}")]
pub struct QueryError {
    pub aggregate: &'static str,
    #[source]
    pub source: RepositoryError,
}

fn labelled(aggregate: &'static str) -> impl FnOnce(RepositoryError) -> QueryError {
    move |source| QueryError { aggregate, source }
}

/// Best-effort summary over the transaction store.
#[derive(Clone)]
pub struct StatisticsService {
    store: Arc<dyn TransactionStore>,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    /// Runs every aggregate concurrently. The reads are not isolated from
    /// each other; a failure in any one of them fails the snapshot.
    pub async fn snapshot(&self) -> Result<Statistics, QueryError> {
        let store = &self.store;

        let (
            total_transactions,
            failed_transactions,
            pending_transactions,
            rejected_transactions,
            total_users,
            average_processing_time,
            currencies,
        ) = tokio::try_join!(
            async { store.count_all().await.map_err(labelled("total_transactions")) },
            async { store.count_not_done().await.map_err(labelled("failed_transactions")) },
            async { store.count_unreconciled().await.map_err(labelled("pending_transactions")) },
            async { store.count_rejected().await.map_err(labelled("rejected_transactions")) },
            async { store.count_distinct_users().await.map_err(labelled("total_users")) },
            async {
                store
                    .average_processing_seconds()
                    .await
                    .map_err(labelled("average_processing_time"))
            },
            async { store.distinct_currencies().await.map_err(labelled("currencies")) },
        )?;

        Ok(Statistics {
            total_transactions,
            failed_transactions,
            pending_transactions,
            rejected_transactions,
            total_users,
            average_processing_time,
            currencies,
        })
    }
}
