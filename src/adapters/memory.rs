//! In-memory stores with failure injection, for exercising the pipeline
//! without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{DeadLetter, NewDeadLetter, NewTransaction, Transaction, TransactionState};
use crate::ports::{ApplyResult, DeadLetterStore, RepositoryError, RepositoryResult, TransactionStore};

#[derive(Default)]
pub struct InMemoryTransactionStore {
    rows: RwLock<HashMap<Uuid, Transaction>>,
    apply_calls: RwLock<Vec<(Uuid, bool)>>,
    failing_applies: AtomicU32,
    unavailable: AtomicBool,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls to `apply_outcome` fail.
    pub fn fail_next_applies(&self, n: u32) {
        self.failing_applies.store(n, Ordering::SeqCst);
    }

    /// Makes every operation fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every `apply_outcome` call in arrival order, including failed ones.
    pub async fn apply_calls(&self) -> Vec<(Uuid, bool)> {
        self.apply_calls.read().await.clone()
    }

    fn check_available(&self) -> RepositoryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }

    async fn count_where(&self, predicate: impl Fn(&Transaction) -> bool) -> RepositoryResult<i64> {
        self.check_available()?;
        Ok(self.rows.read().await.values().filter(|tx| predicate(tx)).count() as i64)
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, new: &NewTransaction) -> RepositoryResult<Transaction> {
        self.check_available()?;
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id: new.user_id.clone(),
            amount: new.amount.clone(),
            currency: new.currency.clone(),
            status: TransactionState::Created,
            done: false,
            created_at: new.created_at,
            processed_at: None,
        };
        self.rows.write().await.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.check_available()?;
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn list(&self) -> RepositoryResult<Vec<Transaction>> {
        self.check_available()?;
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn list_unpublished(&self) -> RepositoryResult<Vec<Transaction>> {
        self.check_available()?;
        let mut created: Vec<Transaction> = self
            .rows
            .read()
            .await
            .values()
            .filter(|tx| tx.status == TransactionState::Created)
            .cloned()
            .collect();
        created.sort_by_key(|tx| tx.created_at);
        Ok(created)
    }

    async fn mark_pending(&self, id: Uuid) -> RepositoryResult<bool> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(tx) if tx.status == TransactionState::Created => {
                tx.status = TransactionState::Pending;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_outcome(
        &self,
        id: Uuid,
        done: bool,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<ApplyResult> {
        self.apply_calls.write().await.push((id, done));
        self.check_available()?;

        let remaining = self.failing_applies.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_applies.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Unavailable("injected apply failure".to_string()));
        }

        let mut rows = self.rows.write().await;
        let tx = rows
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;

        if tx.processed_at.is_some() {
            return Ok(ApplyResult::AlreadyReconciled(tx.clone()));
        }

        tx.done = done;
        tx.status = TransactionState::reconciled(done);
        tx.processed_at = Some(processed_at);
        Ok(ApplyResult::Applied(tx.clone()))
    }

    async fn count_all(&self) -> RepositoryResult<i64> {
        self.count_where(|_| true).await
    }

    async fn count_not_done(&self) -> RepositoryResult<i64> {
        self.count_where(|tx| !tx.done).await
    }

    async fn count_unreconciled(&self) -> RepositoryResult<i64> {
        self.count_where(|tx| tx.processed_at.is_none()).await
    }

    async fn count_rejected(&self) -> RepositoryResult<i64> {
        self.count_where(|tx| tx.processed_at.is_some() && !tx.done).await
    }

    async fn count_distinct_users(&self) -> RepositoryResult<i64> {
        self.check_available()?;
        let rows = self.rows.read().await;
        let users: HashSet<&str> = rows.values().map(|tx| tx.user_id.as_str()).collect();
        Ok(users.len() as i64)
    }

    async fn average_processing_seconds(&self) -> RepositoryResult<Option<f64>> {
        self.check_available()?;
        let rows = self.rows.read().await;
        let durations: Vec<f64> = rows
            .values()
            .filter_map(Transaction::processing_duration)
            .map(|d| d.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0)
            .collect();

        if durations.is_empty() {
            return Ok(None);
        }
        Ok(Some(durations.iter().sum::<f64>() / durations.len() as f64))
    }

    async fn distinct_currencies(&self) -> RepositoryResult<Vec<String>> {
        self.check_available()?;
        let rows = self.rows.read().await;
        let currencies: BTreeSet<String> = rows.values().map(|tx| tx.currency.clone()).collect();
        Ok(currencies.into_iter().collect())
    }
}

#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    entries: RwLock<Vec<DeadLetter>>,
    unavailable: AtomicBool,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn check_available(&self) -> RepositoryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "in-memory dead letter store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn push(&self, entry: NewDeadLetter) -> RepositoryResult<DeadLetter> {
        self.check_available()?;
        let dead_letter = DeadLetter::from_new(Uuid::new_v4(), entry, Utc::now());
        self.entries.write().await.push(dead_letter.clone());
        Ok(dead_letter)
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<DeadLetter>> {
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<DeadLetter> {
        self.check_available()?;
        self.entries
            .read()
            .await
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("dead letter {}", id)))
    }

    async fn remove(&self, id: Uuid) -> RepositoryResult<bool> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        Ok(entries.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Duration;

    fn new_tx(user: &str, currency: &str) -> NewTransaction {
        NewTransaction::new(user, BigDecimal::from(5), currency, None)
    }

    #[tokio::test]
    async fn test_apply_outcome_is_first_write_wins() {
        let store = InMemoryTransactionStore::new();
        let tx = store.create(&new_tx("u1", "USD")).await.unwrap();
        let first = tx.created_at + Duration::seconds(2);

        let applied = store.apply_outcome(tx.id, true, first).await.unwrap();
        assert!(matches!(applied, ApplyResult::Applied(ref t) if t.done));

        let again = store
            .apply_outcome(tx.id, false, first + Duration::seconds(5))
            .await
            .unwrap();
        match again {
            ApplyResult::AlreadyReconciled(t) => {
                assert!(t.done);
                assert_eq!(t.processed_at, Some(first));
            }
            other => panic!("expected AlreadyReconciled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mark_pending_only_from_created() {
        let store = InMemoryTransactionStore::new();
        let tx = store.create(&new_tx("u1", "USD")).await.unwrap();

        assert!(store.mark_pending(tx.id).await.unwrap());
        assert!(!store.mark_pending(tx.id).await.unwrap());

        let other = store.create(&new_tx("u2", "USD")).await.unwrap();
        store.apply_outcome(other.id, true, Utc::now()).await.unwrap();
        assert!(!store.mark_pending(other.id).await.unwrap());
        assert_eq!(store.get(other.id).await.unwrap().status, TransactionState::Completed);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = InMemoryTransactionStore::new();
        let tx = store.create(&new_tx("u1", "USD")).await.unwrap();
        store.fail_next_applies(1);

        assert!(store.apply_outcome(tx.id, true, Utc::now()).await.is_err());
        assert!(store.apply_outcome(tx.id, true, Utc::now()).await.is_ok());
        assert_eq!(store.apply_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_dead_letters_list_newest_first() {
        let store = InMemoryDeadLetterStore::new();
        for offset in 0..3 {
            store
                .push(NewDeadLetter {
                    transaction_id: None,
                    source_topic: "processed_transactions".to_string(),
                    source_partition: 0,
                    source_offset: offset,
                    message_key: None,
                    payload: Some(b"{}".to_vec()),
                    reason: crate::domain::DeadLetterReason::Malformed,
                    error: "bad".to_string(),
                    attempts: 0,
                })
                .await
                .unwrap();
        }

        let listed = store.list(2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].source_offset, 2);
        assert!(store.remove(listed[0].id).await.unwrap());
        assert!(!store.remove(listed[0].id).await.unwrap());
        assert_eq!(store.len().await, 2);
    }
}
