//! Savings tip generation
//!
//! The tip is advisory: `generate_tip` is a total function. Any completion
//! failure is logged and replaced by [`FALLBACK_TIP`].

use tracing::{debug, warn};

use super::{AIClient, CompletionBackend};

/// Shown instead of a tip whenever the completion service fails
pub const FALLBACK_TIP: &str = "AI tip unavailable. Try again later!";

/// Prompt sent for a given spending total (rounded to cents)
pub fn tip_prompt(total_spent: f64) -> String {
    format!(
        "A student spent ${:.2} this month. Suggest a short, motivational saving tip.",
        total_spent
    )
}

/// Generates savings tips from a spending total
#[derive(Clone)]
pub struct TipAdvisor {
    client: AIClient,
}

impl TipAdvisor {
    pub fn new(client: AIClient) -> Self {
        Self { client }
    }

    /// Ask for a tip; returns [`FALLBACK_TIP`] on any failure
    ///
    /// Leading and trailing whitespace is trimmed from the reply. A reply that
    /// is blank after trimming counts as a failure. Text inside the reply is
    /// returned as written.
    pub async fn generate_tip(&self, total_spent: f64) -> String {
        let prompt = tip_prompt(total_spent);
        debug!(total_spent, model = %self.client.model(), "requesting savings tip");

        match self.client.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!(model = %self.client.model(), "completion service returned an empty tip");
                FALLBACK_TIP.to_string()
            }
            Err(e) => {
                warn!(model = %self.client.model(), error = %e, "tip generation failed");
                FALLBACK_TIP.to_string()
            }
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}
