//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `ledger` - One-shot ledger commands (add, list)
//! - `session` - Interactive session loop and screen rendering
//! - `status` - Configuration and backend health

pub mod ledger;
pub mod session;
pub mod status;

// Re-export command functions for main.rs
pub use ledger::*;
pub use session::*;
pub use status::*;
