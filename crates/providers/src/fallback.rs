//! Fallback chain: ordered, winner-take-first answer sourcing.
//!
//! Each source gets exactly one attempt per request, in configured order.
//! The first source whose text is non-empty after trimming wins and the loop
//! stops. Errors, panics, empty text and sources that failed to construct all
//! count as a failed attempt and move on to the next entry. When nothing wins
//! the chain yields the configured fallback message with `success = false`.

use crabai_core::error::ProviderError;
use crabai_core::provider::{AnswerPrompt, AnswerSource, AttemptOutcome};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, warn};

/// An ordered list of answer sources tried until one yields usable text.
pub struct FallbackChain {
    chain: Vec<ChainEntry>,
    fallback_message: String,
}

/// A single slot in the chain. A source that could not be built keeps its
/// slot and fails when its turn comes.
struct ChainEntry {
    name: String,
    source: Result<Arc<dyn AnswerSource>, ProviderError>,
}

/// How one attempt ended.
#[derive(Debug, Clone)]
pub enum AttemptStatus {
    Answered,
    Empty,
    Failed(ProviderError),
}

/// One attempt, for logging and diagnostics.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub provider: String,
    pub status: AttemptStatus,
}

/// The result of running the whole chain once.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// The winning raw text, or the fallback message
    pub text: String,
    pub success: bool,
    /// Name of the winning source
    pub provider: Option<String>,
    /// Every attempt made, in order
    pub attempts: Vec<AttemptRecord>,
}

impl FallbackChain {
    /// Create an empty chain. `fallback_message` is returned when every source fails.
    pub fn new(fallback_message: impl Into<String>) -> Self {
        Self {
            chain: Vec::new(),
            fallback_message: fallback_message.into(),
        }
    }

    /// Append a ready source.
    pub fn add(mut self, source: Arc<dyn AnswerSource>) -> Self {
        self.chain.push(ChainEntry {
            name: source.name().to_string(),
            source: Ok(source),
        });
        self
    }

    /// Append the result of building a source; a construction error holds the slot.
    pub fn add_built(
        mut self,
        name: impl Into<String>,
        source: Result<Arc<dyn AnswerSource>, ProviderError>,
    ) -> Self {
        self.chain.push(ChainEntry {
            name: name.into(),
            source,
        });
        self
    }

    /// Number of slots in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Slot names in preference order, with whether each was constructed.
    pub fn entries(&self) -> Vec<(&str, bool)> {
        self.chain
            .iter()
            .map(|e| (e.name.as_str(), e.source.is_ok()))
            .collect()
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    /// Try each source in order until one answers.
    pub async fn run(&self, prompt: &AnswerPrompt) -> ChainOutcome {
        let total = self.chain.len();
        let mut attempts = Vec::with_capacity(total);

        for (i, entry) in self.chain.iter().enumerate() {
            info!(
                provider = %entry.name,
                attempt = i + 1,
                total,
                "Fallback: trying provider"
            );

            let outcome = match &entry.source {
                Ok(source) => AttemptOutcome::classify(Self::call(source.as_ref(), prompt).await),
                Err(e) => AttemptOutcome::Failed(e.clone()),
            };

            match outcome {
                AttemptOutcome::Answered(text) => {
                    info!(provider = %entry.name, attempt = i + 1, "Fallback: provider succeeded");
                    attempts.push(AttemptRecord {
                        provider: entry.name.clone(),
                        status: AttemptStatus::Answered,
                    });
                    return ChainOutcome {
                        text,
                        success: true,
                        provider: Some(entry.name.clone()),
                        attempts,
                    };
                }
                AttemptOutcome::Empty => {
                    warn!(provider = %entry.name, "Fallback: provider returned empty text, trying next");
                    attempts.push(AttemptRecord {
                        provider: entry.name.clone(),
                        status: AttemptStatus::Empty,
                    });
                }
                AttemptOutcome::Failed(e) => {
                    warn!(
                        provider = %entry.name,
                        error = %e,
                        "Fallback: provider failed, trying next"
                    );
                    attempts.push(AttemptRecord {
                        provider: entry.name.clone(),
                        status: AttemptStatus::Failed(e),
                    });
                }
            }
        }

        warn!(total, "Fallback: all providers failed");
        ChainOutcome {
            text: self.fallback_message.clone(),
            success: false,
            provider: None,
            attempts,
        }
    }

    /// One attempt, with a panic inside the source turned into an error.
    async fn call(source: &dyn AnswerSource, prompt: &AnswerPrompt) -> Result<String, ProviderError> {
        match AssertUnwindSafe(source.attempt(prompt)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                Err(ProviderError::Panicked(reason))
            }
        }
    }
}
