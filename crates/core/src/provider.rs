//! AnswerSource trait: the abstraction over external answer backends.
//!
//! An answer source wraps exactly one external capability (a chat-completion
//! model, a page-summary lookup, a translation call) and normalizes its native
//! failures into a [`ProviderError`]. Sources are stateless between calls and
//! safe to share across requests.
//!
//! Implementations: OpenAI-compatible chat completion, Wikipedia summary,
//! translation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// Everything a source may need to answer one query.
///
/// Conversational sources use `messages`; single-shot sources use `prompt`
/// or the raw `query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPrompt {
    /// The query exactly as the user typed it
    pub query: String,

    /// The query expanded for the model (e.g. the detailed-explanation prefix)
    pub prompt: String,

    /// System message, replayed history (oldest first), then `prompt` last
    pub messages: Vec<Message>,

    /// Whether the user asked for a detailed answer
    #[serde(default)]
    pub detailed: bool,
}

impl AnswerPrompt {
    /// A prompt with no history and no system message.
    pub fn bare(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            prompt: query.clone(),
            messages: vec![Message::user(query.clone())],
            query,
            detailed: false,
        }
    }
}

/// The classified result of one attempt against one source.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// Non-empty text after trimming
    Answered(String),
    /// The call returned normally but the text was empty or whitespace
    Empty,
    /// The call failed
    Failed(ProviderError),
}

impl AttemptOutcome {
    /// Classify a raw source result. Whitespace-only text is a failure.
    pub fn classify(result: std::result::Result<String, ProviderError>) -> Self {
        match result {
            Ok(text) if text.trim().is_empty() => AttemptOutcome::Empty,
            Ok(text) => AttemptOutcome::Answered(text),
            Err(e) => AttemptOutcome::Failed(e),
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, AttemptOutcome::Answered(_))
    }
}

/// The core AnswerSource trait.
///
/// Every backend implements this trait. The fallback chain calls `attempt()`
/// without knowing which backend is behind it.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// A human-readable name for this source (e.g., "deepinfra", "wikipedia").
    fn name(&self) -> &str;

    /// Make exactly one attempt at answering. Must not panic on bad input.
    async fn attempt(&self, prompt: &AnswerPrompt) -> std::result::Result<String, ProviderError>;
}
