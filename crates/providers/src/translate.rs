//! Machine-translation source.
//!
//! Speaks the public `translate_a/single` endpoint: source language is
//! auto-detected, the target is configured. Used both as a chain entry
//! (translating the user's query) and by the standalone translate route.

use async_trait::async_trait;
use crabai_core::error::ProviderError;
use crabai_core::provider::{AnswerPrompt, AnswerSource};
use std::time::Duration;
use tracing::debug;

pub struct TranslateSource {
    name: String,
    api_url: String,
    target_language: String,
    client: reqwest::Client,
}

impl TranslateSource {
    pub fn new(
        name: impl Into<String>,
        api_url: impl Into<String>,
        target_language: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let target_language = target_language.into();
        if target_language.trim().is_empty() {
            return Err(ProviderError::Construction(
                "Translation target language must not be empty".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Construction(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            api_url: api_url.into(),
            target_language,
            client,
        })
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    /// Translate `text` into the target language.
    pub async fn translate(&self, text: &str) -> Result<String, ProviderError> {
        debug!(provider = %self.name, target = %self.target_language, len = text.len(), "Translating");

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", self.target_language.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 30,
            });
        }
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Translation body: {e}")))?;

        parse_segments(&body)
    }
}

/// The body is `[[["<translated>", "<original>", ...], ...], ...]`; the
/// translation is the concatenation of every segment's first element.
fn parse_segments(body: &serde_json::Value) -> Result<String, ProviderError> {
    let segments = body
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("No translation segments".into()))?;

    Ok(segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(|s| s.as_str()))
        .collect())
}

#[async_trait]
impl AnswerSource for TranslateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, prompt: &AnswerPrompt) -> Result<String, ProviderError> {
        self.translate(&prompt.query).await
    }
}
