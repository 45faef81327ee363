//! Prompt assembly.
//!
//! Produces the role-tagged message list for one request: the system message,
//! then a user/assistant pair per context turn (oldest first), then the new
//! query last. A detailed request gets the configured prefix on its query.

use crabai_config::ChatConfig;
use crabai_core::message::Message;
use crabai_core::provider::AnswerPrompt;
use crabai_store::ContextPair;

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    detailed_prefix: String,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>, detailed_prefix: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            detailed_prefix: detailed_prefix.into(),
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(&config.system_prompt, &config.detailed_prefix)
    }

    /// Build the prompt for `query` given prior context (oldest first).
    pub fn build(&self, query: &str, context: &[ContextPair], detailed: bool) -> AnswerPrompt {
        let prompt = if detailed {
            format!("{}{}", self.detailed_prefix, query)
        } else {
            query.to_string()
        };

        let mut messages = Vec::with_capacity(context.len() * 2 + 2);
        if !self.system_prompt.is_empty() {
            messages.push(Message::system(&self.system_prompt));
        }
        for pair in context {
            messages.push(Message::user(&pair.query));
            messages.push(Message::assistant(&pair.result));
        }
        messages.push(Message::user(&prompt));

        AnswerPrompt {
            query: query.to_string(),
            prompt,
            messages,
            detailed,
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}
