//! In-process ledger backend
//!
//! Keeps the collection in memory and pushes a full snapshot to every
//! subscriber after each mutation. Clones share the same collection, so a
//! clone behaves like a second client of the same remote store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{ExpenseRecord, NewExpense, Snapshot};

use super::{LedgerStore, Subscription, Unsubscribe};

#[derive(Default)]
struct Inner {
    records: Vec<ExpenseRecord>,
    subscribers: Vec<(CancellationToken, mpsc::UnboundedSender<Snapshot>)>,
}

impl Inner {
    /// Send the current collection to every live subscriber
    fn publish(&mut self) {
        let snapshot = self.records.clone();
        self.subscribers
            .retain(|(token, tx)| !token.is_cancelled() && tx.send(snapshot.clone()).is_ok());
    }
}

/// In-memory ledger for tests and offline demos
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    fail_appends: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection pre-filled with records
    pub fn with_records(records: Vec<ExpenseRecord>) -> Self {
        let store = Self::new();
        store.lock().records = records;
        store
    }

    /// Make every subsequent append fail (or succeed again)
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Remove a record, as another client would
    ///
    /// Returns whether a record with that id existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        let removed = inner.records.len() != before;
        if removed {
            inner.publish();
        }
        removed
    }

    /// Current contents of the collection
    pub fn records(&self) -> Vec<ExpenseRecord> {
        self.lock().records.clone()
    }

    /// Number of subscriptions still receiving snapshots
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner
            .subscribers
            .retain(|(token, tx)| !token.is_cancelled() && !tx.is_closed());
        inner.subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Every mutation completes under the lock, so a poisoned guard is still consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(&self, expense: NewExpense) -> Result<ExpenseRecord> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::Store("in-memory ledger is rejecting writes".into()));
        }
        if !expense.amount.is_finite() {
            return Err(Error::Store(format!(
                "refusing to store non-finite amount {}",
                expense.amount
            )));
        }

        let record = expense.into_record(uuid::Uuid::new_v4().to_string());
        let mut inner = self.lock();
        inner.records.push(record.clone());
        inner.publish();
        debug!(id = %record.id, amount = record.amount, "appended expense in memory");

        Ok(record)
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let mut inner = self.lock();
        // Send cannot fail: rx is still in scope
        let _ = tx.send(inner.records.clone());
        inner.subscribers.push((token.clone(), tx));

        Ok(Subscription::new(rx, Unsubscribe::new(token)))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
