//! Mock backend for testing
//!
//! Returns a fixed completion (or fails on every call) and records the
//! prompts it receives. Useful for unit tests and running without an API key.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::CompletionBackend;

const DEFAULT_MOCK_REPLY: &str =
    "Set a weekly spending cap and move whatever is left into savings on Sunday.";

/// Mock completion backend
///
/// Clones share the prompt log so a test can keep a handle after passing the
/// backend into a session.
#[derive(Clone)]
pub struct MockBackend {
    /// Completion text, or `None` to fail every call
    reply: Option<String>,
    /// Whether health_check should return true
    pub healthy: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a healthy mock returning a canned tip
    pub fn new() -> Self {
        Self::with_reply(DEFAULT_MOCK_REPLY)
    }

    /// Create a mock returning `reply` for every prompt
    pub fn with_reply(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            healthy: true,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose completions always fail
    pub fn failing() -> Self {
        Self {
            reply: None,
            healthy: false,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.reply
            .clone()
            .ok_or_else(|| Error::Completion("mock backend configured to fail".into()))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://"
    }
}
