//! Wikipedia page-summary source.
//!
//! Looks the raw user query up as a page title. A normal request returns the
//! REST summary extract; a detailed request returns the plain-text lead
//! section through the action API, which is considerably longer.

use async_trait::async_trait;
use crabai_core::error::ProviderError;
use crabai_core::provider::{AnswerPrompt, AnswerSource};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Upper bound on the detailed extract, in characters.
const DETAILED_MAX_CHARS: u32 = 4000;

pub struct WikipediaSource {
    name: String,
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl WikipediaSource {
    /// Create a source for one language edition (e.g. `"en"`).
    pub fn new(
        name: impl Into<String>,
        language: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(name, &format!("https://{language}.wikipedia.org"), timeout)
    }

    /// Create a source against an explicit base URL (mirrors, tests).
    pub fn with_base_url(
        name: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| ProviderError::Construction(format!("Invalid Wikipedia URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Construction(format!(
                "Wikipedia URL cannot be a base: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crabai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Construction(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url,
            client,
        })
    }

    /// `<base>/api/rest_v1/page/summary/<title>` with the title as one encoded segment.
    fn summary_url(&self, title: &str) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "rest_v1", "page", "summary"])
                .push(&title.replace(' ', "_"));
        }
        url
    }

    fn action_api_url(&self) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["w", "api.php"]);
        }
        url
    }

    async fn summary(&self, title: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(self.summary_url(title))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ProviderError::ApiError {
                status_code: status,
                message: format!("No Wikipedia page for '{title}'"),
            });
        }
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            });
        }

        let summary: SummaryResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Summary body: {e}")))?;

        if summary.kind.as_deref() == Some("disambiguation") {
            return Err(ProviderError::InvalidResponse(format!(
                "'{title}' is a disambiguation page"
            )));
        }

        Ok(summary.extract.unwrap_or_default())
    }

    async fn lead_section(&self, title: &str) -> Result<String, ProviderError> {
        let max_chars = DETAILED_MAX_CHARS.to_string();
        let response = self
            .client
            .get(self.action_api_url())
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("format", "json"),
                ("exchars", max_chars.as_str()),
                ("titles", title),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            });
        }

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Extract body: {e}")))?;

        Ok(body.first_extract().unwrap_or_default())
    }
}

#[async_trait]
impl AnswerSource for WikipediaSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, prompt: &AnswerPrompt) -> Result<String, ProviderError> {
        let title = prompt.query.trim();
        if title.is_empty() {
            return Err(ProviderError::InvalidResponse("Empty page title".into()));
        }

        debug!(provider = %self.name, title, detailed = prompt.detailed, "Looking up page");

        if prompt.detailed {
            self.lead_section(title).await
        } else {
            self.summary(title).await
        }
    }
}

// --- Wikipedia API types ---

#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    extract: Option<String>,
}

#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    query: Option<ExtractQuery>,
}

#[derive(Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: HashMap<String, ExtractPage>,
}

#[derive(Deserialize)]
struct ExtractPage {
    #[serde(default)]
    extract: Option<String>,
}

impl ExtractResponse {
    /// The action API keys pages by id; a missing page has id "-1" and no extract.
    fn first_extract(self) -> Option<String> {
        self.query?
            .pages
            .into_values()
            .find_map(|page| page.extract.filter(|e| !e.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> WikipediaSource {
        WikipediaSource::new("wikipedia", "en", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn summary_url_encodes_title_as_single_segment() {
        let url = source().summary_url("Rust (programming language)/x");
        assert_eq!(url.host_str(), Some("en.wikipedia.org"));
        assert!(
            url.path()
                .starts_with("/api/rest_v1/page/summary/Rust_(programming_language)%2Fx")
        );
    }

    #[test]
    fn action_api_url_path() {
        assert_eq!(source().action_api_url().path(), "/w/api.php");
    }

    #[test]
    fn invalid_base_url_fails_construction() {
        let result = WikipediaSource::with_base_url("w", "not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(ProviderError::Construction(_))));
    }

    #[test]
    fn parses_summary_body() {
        let body = r#"{"type":"standard","title":"Paris","extract":"Paris is the capital of France."}"#;
        let parsed: SummaryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.extract.as_deref(), Some("Paris is the capital of France."));
    }

    #[test]
    fn extracts_first_page_with_text() {
        let body = r#"{"query":{"pages":{"22989":{"pageid":22989,"title":"Paris","extract":"Paris is the capital and largest city of France."}}}}"#;
        let parsed: ExtractResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.first_extract().as_deref(),
            Some("Paris is the capital and largest city of France.")
        );
    }

    #[test]
    fn missing_page_has_no_extract() {
        let body = r#"{"query":{"pages":{"-1":{"title":"Zzzxq","missing":""}}}}"#;
        let parsed: ExtractResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.first_extract().is_none());
    }

    #[tokio::test]
    async fn blank_query_fails_without_network() {
        let result = source().attempt(&AnswerPrompt::bare("   ")).await;
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }
}
