use super::{CompletionClient, CompletionError, CompletionRequest, http_client, non_empty};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenAI, Groq, vLLM).
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiChatClient {
    /// Create a client for the API rooted at `base_url` (for example `https://api.groq.com/openai/v1`).
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let payload = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        non_empty(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarization::ChatMessage;
    use httpmock::{Method::POST, MockServer};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "llama-3.3-70b-versatile".into(),
            messages: vec![ChatMessage::user("Summarize")],
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn sends_bearer_key_and_reads_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/v1/chat/completions")
                    .header("authorization", "Bearer secret")
                    .body_contains("llama-3.3-70b-versatile");
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "First" } },
                        { "message": { "role": "assistant", "content": "Second" } }
                    ]
                }));
            })
            .await;

        let client = OpenAiChatClient::new(
            format!("{}/openai/v1/", server.base_url()),
            "secret".into(),
            Duration::from_secs(5),
        )
        .expect("client");
        let text = client.complete(request()).await.expect("text");

        mock.assert_async().await;
        assert_eq!(text, "First");
    }

    #[tokio::test]
    async fn missing_choices_is_an_empty_completion() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let client = OpenAiChatClient::new(server.base_url(), "k".into(), Duration::from_secs(5))
            .expect("client");
        let error = client.complete(request()).await.unwrap_err();
        assert!(matches!(error, CompletionError::EmptyCompletion));
    }

    #[tokio::test]
    async fn rate_limits_are_retryable_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let client = OpenAiChatClient::new(server.base_url(), "k".into(), Duration::from_secs(5))
            .expect("client");
        let error = client.complete(request()).await.unwrap_err();
        assert!(matches!(
            error,
            CompletionError::GenerationFailed { status: 429, .. }
        ));
        assert!(error.is_retryable());
    }
}
