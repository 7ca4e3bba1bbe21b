//! Pluggable text-completion backends and the savings tip advisor
//!
//! # Architecture
//!
//! - `CompletionBackend` trait: a single prompt in, completion text out
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//! - `TipAdvisor`: turns a spending total into a tip, never failing
//!
//! # Usage
//!
//! ```rust,ignore
//! let advisor = TipAdvisor::new(AIClient::mock());
//! let tip = advisor.generate_tip(42.0).await;
//! println!("💡 {}", tip);
//! ```

mod mock;
mod openai_compatible;
mod tip;

pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use tip::{tip_prompt, TipAdvisor, FALLBACK_TIP};

use async_trait::async_trait;

use crate::error::Result;

/// Trait defining the interface for all completion backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send one user message and return the first completion's text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI or any server implementing `/v1/chat/completions`
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

// Implement CompletionBackend for AIClient by delegating to the inner backend
#[async_trait]
impl CompletionBackend for AIClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete(prompt).await,
            AIClient::Mock(b) => b.complete(prompt).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
