//! Bearcat Core Library
//!
//! Shared functionality for the Bearcat student expense tracker:
//! - Ledger store adapter (Cloud Firestore REST, in-memory)
//! - Savings tip generation over OpenAI-compatible chat completions
//! - Session controller for the append → tip workflow
//! - Configuration from TOML and environment

pub mod ai;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod store;

/// Test utilities including mock completion and Firestore servers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    tip_prompt, AIClient, CompletionBackend, MockBackend, OpenAICompatibleBackend, TipAdvisor,
    FALLBACK_TIP,
};
pub use config::{AdvisorBackend, AdvisorConfig, Config, LedgerBackend, StoreConfig};
pub use error::{Error, Result, ValidationError};
pub use models::{parse_amount, total_spent, ExpenseRecord, NewExpense, Snapshot};
pub use session::{Phase, SessionController, SessionEvent, SessionState, SessionUpdate, SubmitOutcome};
pub use store::{FirestoreStore, LedgerClient, LedgerStore, MemoryStore, Subscription, Unsubscribe};
