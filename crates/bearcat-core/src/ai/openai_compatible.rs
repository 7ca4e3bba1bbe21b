//! OpenAI-compatible backend implementation
//!
//! Works with the OpenAI API and any server that implements the chat
//! completions endpoint (vLLM, LocalAI, llama-server, ...).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DEFAULT_OPENAI_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::error::{Error, Result};

use super::CompletionBackend;

/// OpenAI-compatible backend
///
/// Sends a single user message to `/v1/chat/completions` and returns the
/// first choice's text.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        let model = if model.is_empty() {
            DEFAULT_OPENAI_MODEL
        } else {
            model
        };
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = (!api_key.is_empty()).then(|| api_key.to_string());
        backend
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: None,
            max_tokens: None,
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Completion(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Completion("No response from OpenAI API".into()))
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message (content is null for refusals and tool calls)
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionBackend for OpenAICompatibleBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_length = prompt.len(), "sending chat completion");
        let response = self.chat_completion(prompt).await?;
        debug!("OpenAI-compatible response: {}", response);
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        let mut req = self
            .http_client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(self.timeout);
        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CompletionBehavior, MockCompletionServer};

    #[test]
    fn test_backend_new() {
        let backend = OpenAICompatibleBackend::new("https://api.openai.com", "gpt-3.5-turbo");
        assert_eq!(backend.model(), "gpt-3.5-turbo");
        assert_eq!(backend.host(), "https://api.openai.com");
        assert!(backend.api_key.is_none());
    }

    #[test]
    fn test_backend_new_trims_trailing_slash() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8000/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:8000");
    }

    #[test]
    fn test_backend_empty_model_uses_default() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8000", "");
        assert_eq!(backend.model(), DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn test_backend_with_api_key() {
        let backend =
            OpenAICompatibleBackend::with_api_key("http://localhost:8000", "gpt-4", "sk-test123");
        assert_eq!(backend.model(), "gpt-4");
        assert_eq!(backend.api_key, Some("sk-test123".to_string()));
    }

    #[test]
    fn test_with_timeout() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8000", "gpt-4")
            .with_timeout(Duration::from_millis(250));
        assert_eq!(backend.timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OpenAICompatibleBackend::new("http://127.0.0.1:1", "gpt-3.5-turbo");
        assert!(!backend.health_check().await);
    }

    #[test]
    fn test_chat_completion_request_serialization() {
        let request = ChatCompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Hello".to_string(),
            }],
            temperature: None,
            max_tokens: None,
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert_eq!(json["stream"], false);
        // Optional sampling fields are omitted when None
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_chat_completion_response_deserialization() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Skip one takeout meal a week."
                },
                "finish_reason": "stop"
            }]
        }"#;

        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("Skip one takeout meal a week.")
        );
    }

    #[test]
    fn test_null_content_deserializes() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert!(response.choices[0].message.content.is_none());
    }

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        let server = MockCompletionServer::start(CompletionBehavior::Reply(
            "Brew coffee at home.".to_string(),
        ))
        .await;
        let backend =
            OpenAICompatibleBackend::with_api_key(&server.url(), "gpt-3.5-turbo", "sk-live");

        let text = backend.complete("Give me a tip").await.unwrap();
        assert_eq!(text, "Brew coffee at home.");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-3.5-turbo");
        assert_eq!(requests[0].prompt, "Give me a tip");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-live"));
        assert!(backend.health_check().await);
    }

    #[tokio::test]
    async fn test_complete_error_status() {
        let server = MockCompletionServer::start(CompletionBehavior::Status(429)).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo");

        let err = backend.complete("tip").await.unwrap_err();
        assert!(matches!(err, Error::Completion(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_complete_empty_choices() {
        let server = MockCompletionServer::start(CompletionBehavior::NoChoices).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo");
        assert!(matches!(
            backend.complete("tip").await,
            Err(Error::Completion(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_malformed_body() {
        let server = MockCompletionServer::start(CompletionBehavior::Malformed).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo");
        assert!(backend.complete("tip").await.is_err());
    }

    #[tokio::test]
    async fn test_complete_times_out() {
        let server = MockCompletionServer::start(CompletionBehavior::Delay(
            Duration::from_secs(5),
            "too late".to_string(),
        ))
        .await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "gpt-3.5-turbo")
            .with_timeout(Duration::from_millis(100));

        let err = backend.complete("tip").await.unwrap_err();
        assert!(matches!(err, Error::Http(ref e) if e.is_timeout()));
    }
}
