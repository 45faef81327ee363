//! OpenAI-compatible chat-completion source.
//!
//! Works with: OpenAI, OpenRouter, DeepInfra, Groq, Ollama, vLLM,
//! and any endpoint exposing `/chat/completions`.

use async_trait::async_trait;
use crabai_core::error::ProviderError;
use crabai_core::message::Message;
use crabai_core::provider::{AnswerPrompt, AnswerSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible conversational answer source.
///
/// Sends the full role-tagged message list, so it sees the replayed history.
pub struct OpenAiCompatSource {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatSource {
    /// Create a new OpenAI-compatible source.
    ///
    /// `timeout` bounds each attempt at the transport level.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Construction(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
            })
            .collect()
    }
}

#[async_trait]
impl AnswerSource for OpenAiCompatSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, prompt: &AnswerPrompt) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&prompt.messages),
            "stream": false,
        });

        debug!(provider = %self.name, model = %self.model, "Sending completion request");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

// --- OpenAI API types ---

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> OpenAiCompatSource {
        OpenAiCompatSource::new(
            "test",
            "https://api.example.com/v1/",
            "sk-test",
            "gpt-4o-mini",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(source().base_url, "https://api.example.com/v1");
        assert_eq!(source().name(), "test");
    }

    #[test]
    fn messages_keep_roles_and_order() {
        let api = OpenAiCompatSource::to_api_messages(&[
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("capital of France"),
        ]);
        let roles: Vec<_> = api.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(api[3].content.as_deref(), Some("capital of France"));
    }

    #[test]
    fn parses_completion_body() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Paris."}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Paris."));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let source = OpenAiCompatSource::new(
            "dead",
            "http://127.0.0.1:1",
            "",
            "m",
            Duration::from_secs(2),
        )
        .unwrap();
        let result = source.attempt(&AnswerPrompt::bare("hi")).await;
        assert!(matches!(result, Err(ProviderError::Network(_))));
    }
}
