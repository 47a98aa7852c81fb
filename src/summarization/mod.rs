//! Clients for the external summarization service.
//!
//! Both pipeline stages talk to the service through [`CompletionClient`]: a request carries
//! role-tagged chat messages, a model identifier, and a temperature, and the response is the
//! free-form completion text. The service enforces no schema; the analysis extractor is the only
//! defense against malformed output. Clients are constructed explicitly from [`Config`] and
//! injected into the pipeline so tests can substitute scripted doubles.

mod ollama;
mod openai;
mod retry;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaChatClient;
pub use openai::OpenAiChatClient;
pub use retry::{RetryPolicy, RetryingClient};

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider could not be reached or the request timed out.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider answered with a non-success status.
    #[error("Provider returned {status}: {message}")]
    GenerationFailed {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body or diagnostic text.
        message: String,
    },
    /// Provider response could not be decoded.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider answered successfully but without any text.
    #[error("Provider returned an empty completion")]
    EmptyCompletion,
}

impl CompletionError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(_) => true,
            Self::GenerationFailed { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::EmptyCompletion => false,
        }
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the task.
    System,
    /// Task input.
    User,
}

/// Single role-tagged prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request payload passed to the summarization provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Ordered prompt messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by summarization providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the completion text for the request.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Build the configured client, wrapped in the retry policy.
pub fn build_completion_client(
    config: &Config,
) -> Result<Arc<dyn CompletionClient>, CompletionError> {
    let timeout = Duration::from_secs(config.llm_request_timeout_secs);
    let inner: Arc<dyn CompletionClient> = match config.llm_provider {
        LlmProvider::Ollama => {
            let base_url = config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Arc::new(OllamaChatClient::new(base_url, timeout)?)
        }
        LlmProvider::OpenAI => {
            let base_url = config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
            let api_key = config.llm_api_key.clone().ok_or_else(|| {
                CompletionError::ProviderUnavailable("LLM_API_KEY is not configured".into())
            })?;
            Arc::new(OpenAiChatClient::new(base_url, api_key, timeout)?)
        }
    };
    tracing::info!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        max_retries = config.llm_max_retries,
        "Summarization client initialized"
    );
    Ok(Arc::new(RetryingClient::new(
        inner,
        RetryPolicy::with_retries(config.llm_max_retries),
    )))
}

fn http_client(timeout: Duration) -> Result<Client, CompletionError> {
    Client::builder()
        .user_agent("rusty-reader/analysis")
        .timeout(timeout)
        .build()
        .map_err(|error| {
            CompletionError::ProviderUnavailable(format!("failed to build HTTP client: {error}"))
        })
}

fn non_empty(text: &str) -> Result<String, CompletionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(CompletionError::EmptyCompletion)
    } else {
        Ok(trimmed.to_string())
    }
}
