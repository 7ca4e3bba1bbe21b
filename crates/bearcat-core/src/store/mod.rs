//! Ledger store adapter
//!
//! Wraps the remote `expenses` collection behind two operations: append a
//! record, and subscribe to full snapshots of the collection.
//!
//! # Architecture
//!
//! - `LedgerStore` trait: the interface every backend implements
//! - `LedgerClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `FirestoreStore` (REST), `MemoryStore` (in-process)
//!
//! Subscriptions are channels of whole snapshots. Every change to the
//! collection, from any client, republishes the entire collection.

pub(crate) mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{ExpenseRecord, NewExpense, Snapshot};

/// Trait defining the interface for all ledger backends
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Write a new expense and return it with its store-assigned id
    ///
    /// Callers validate the amount first; no retry happens here.
    async fn append(&self, expense: NewExpense) -> Result<ExpenseRecord>;

    /// Subscribe to the collection
    ///
    /// The current state is delivered immediately, then again after every
    /// change. Failing to read the initial state is returned as an error.
    async fn subscribe(&self) -> Result<Subscription>;

    /// Short backend description (for logging)
    fn describe(&self) -> String;
}

/// Handle that stops a subscription
///
/// Cancelling is idempotent; every call after the first is a no-op.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    token: CancellationToken,
}

impl Unsubscribe {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn unsubscribe(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("unsubscribing from expenses collection");
            self.token.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

/// A live stream of collection snapshots
#[derive(Debug)]
pub struct Subscription {
    snapshots: mpsc::UnboundedReceiver<Snapshot>,
    handle: Unsubscribe,
}

impl Subscription {
    pub(crate) fn new(snapshots: mpsc::UnboundedReceiver<Snapshot>, handle: Unsubscribe) -> Self {
        Self { snapshots, handle }
    }

    /// Wait for the next snapshot
    ///
    /// Returns `None` once unsubscribed (buffered snapshots are dropped) or
    /// when the backend stops publishing.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if !self.handle.is_active() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.handle.token.cancelled() => None,
            snapshot = self.snapshots.recv() => snapshot,
        }
    }

    /// Clone of the cancellation handle
    pub fn handle(&self) -> Unsubscribe {
        self.handle.clone()
    }

    pub fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }
}

/// Concrete ledger client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum LedgerClient {
    /// Cloud Firestore over its REST API
    Firestore(FirestoreStore),
    /// In-process collection (tests, demos)
    Memory(MemoryStore),
}

impl LedgerClient {
    /// Create an empty in-process ledger
    pub fn memory() -> Self {
        LedgerClient::Memory(MemoryStore::new())
    }
}

#[async_trait]
impl LedgerStore for LedgerClient {
    async fn append(&self, expense: NewExpense) -> Result<ExpenseRecord> {
        match self {
            LedgerClient::Firestore(s) => s.append(expense).await,
            LedgerClient::Memory(s) => s.append(expense).await,
        }
    }

    async fn subscribe(&self) -> Result<Subscription> {
        match self {
            LedgerClient::Firestore(s) => s.subscribe().await,
            LedgerClient::Memory(s) => s.subscribe().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            LedgerClient::Firestore(s) => s.describe(),
            LedgerClient::Memory(s) => s.describe(),
        }
    }
}
