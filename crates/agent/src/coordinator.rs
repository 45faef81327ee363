//! Request coordinator: the single entry point for answering a query.
//!
//! One request moves through
//! `Received → ContextLoaded → ProviderAttempt → {Succeeded | AllFailed}
//! → Persisted → Responded` and always reaches `Responded`. Only an empty
//! query is rejected; provider and store failures degrade to soft outcomes.

use crabai_config::ChatConfig;
use crabai_core::conversation::{ChatId, TurnId, UserId};
use crabai_core::error::ValidationError;
use crabai_providers::{FallbackChain, ResponseSanitizer};
use crabai_store::ConversationStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::prompt::PromptBuilder;

/// Explicit per-request state handed into the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: UserId,
}

impl RequestContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// A query as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub detailed: bool,
    /// Re-display of a stored turn; never persisted again
    #[serde(default)]
    pub from_history: bool,
}

impl AskRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn in_chat(mut self, chat_id: Option<ChatId>) -> Self {
        self.chat_id = chat_id;
        self
    }

    pub fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    pub fn from_history(mut self, from_history: bool) -> Self {
        self.from_history = from_history;
        self
    }
}

/// What the caller gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerReply {
    pub query: String,
    pub result: String,
    pub success: bool,
    /// Set when a new turn was stored
    pub turn_id: Option<TurnId>,
    /// The thread the answer belongs to (new, given, or none)
    pub chat_id: Option<ChatId>,
    /// The source that produced the answer
    pub provider: Option<String>,
}

/// Lifecycle of a single request, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    ContextLoaded,
    ProviderAttempt,
    Succeeded,
    AllFailed,
    Persisted,
    Responded,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::ContextLoaded => "context_loaded",
            Self::ProviderAttempt => "provider_attempt",
            Self::Succeeded => "succeeded",
            Self::AllFailed => "all_failed",
            Self::Persisted => "persisted",
            Self::Responded => "responded",
        };
        write!(f, "{s}")
    }
}

/// Ties context loading, the fallback chain, sanitizing and persistence
/// together for one query.
pub struct RequestCoordinator {
    chain: FallbackChain,
    sanitizer: ResponseSanitizer,
    conversations: ConversationStore,
    prompts: PromptBuilder,
}

impl RequestCoordinator {
    pub fn new(chain: FallbackChain, conversations: ConversationStore) -> Self {
        Self {
            chain,
            sanitizer: ResponseSanitizer::default(),
            conversations,
            prompts: PromptBuilder::default(),
        }
    }

    /// Build with the sanitizer markers and prompt settings of `config`.
    pub fn from_config(
        config: &ChatConfig,
        chain: FallbackChain,
        conversations: ConversationStore,
    ) -> Self {
        Self::new(chain, conversations)
            .with_sanitizer(ResponseSanitizer::new(config.blocked_markers.iter().cloned()))
            .with_prompts(PromptBuilder::from_config(config))
    }

    pub fn with_sanitizer(mut self, sanitizer: ResponseSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Answer one query for the user in `ctx`.
    pub async fn answer(
        &self,
        ctx: &RequestContext,
        request: AskRequest,
    ) -> Result<AnswerReply, ValidationError> {
        let user = ctx.user_id;
        if request.query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        Self::phase(user, RequestPhase::Received);

        let context = match self.conversations.context_for(user).await {
            Ok(context) => context,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Could not load context, continuing without it");
                Vec::new()
            }
        };
        Self::phase(user, RequestPhase::ContextLoaded);

        let prompt = self.prompts.build(&request.query, &context, request.detailed);
        Self::phase(user, RequestPhase::ProviderAttempt);
        let outcome = self.chain.run(&prompt).await;

        let mut reply = AnswerReply {
            query: request.query,
            result: outcome.text,
            success: outcome.success,
            turn_id: None,
            chat_id: request.chat_id,
            provider: outcome.provider,
        };

        if !reply.success {
            Self::phase(user, RequestPhase::AllFailed);
            Self::phase(user, RequestPhase::Responded);
            return Ok(reply);
        }

        reply.result = self.sanitizer.sanitize(&reply.result);
        Self::phase(user, RequestPhase::Succeeded);

        if request.from_history {
            debug!(user_id = %user, "Replay of a stored turn, not persisting");
        } else {
            self.persist(user, &mut reply).await;
        }

        Self::phase(user, RequestPhase::Responded);
        info!(
            user_id = %user,
            provider = reply.provider.as_deref().unwrap_or("-"),
            chat_id = ?reply.chat_id,
            turn_id = ?reply.turn_id,
            "Request answered"
        );
        Ok(reply)
    }

    /// Store the turn, creating the chat first when needed. Failures leave
    /// the answer intact.
    async fn persist(&self, user: UserId, reply: &mut AnswerReply) {
        let chat = match self
            .conversations
            .ensure_chat(user, reply.chat_id, &reply.query)
            .await
        {
            Ok(chat) => chat,
            Err(e) => {
                error!(user_id = %user, error = %e, "Could not create chat, answer shown but not saved");
                reply.chat_id = None;
                return;
            }
        };
        reply.chat_id = Some(chat);

        match self
            .conversations
            .record_turn(user, chat, &reply.query, &reply.result)
            .await
        {
            Ok(turn) => {
                reply.turn_id = Some(turn);
                Self::phase(user, RequestPhase::Persisted);
            }
            Err(e) => {
                error!(
                    user_id = %user,
                    chat_id = %chat,
                    error = %e,
                    "Could not save turn, answer shown but not saved"
                );
            }
        }
    }

    fn phase(user: UserId, phase: RequestPhase) {
        debug!(user_id = %user, %phase, "Request phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FlakyStore, RecordingSource};
    use crabai_core::error::ProviderError;
    use crabai_core::store::RowStore;
    use std::sync::Arc;

    async fn setup(
        sources: Vec<Arc<RecordingSource>>,
        rows: Arc<FlakyStore>,
    ) -> (RequestCoordinator, RequestContext) {
        let user = rows.create_user("tester", "h").await.unwrap();
        let chain = sources
            .into_iter()
            .fold(FallbackChain::new("sorry"), |chain, s| chain.add(s));
        let coordinator = RequestCoordinator::from_config(
            &ChatConfig::default(),
            chain,
            ConversationStore::new(rows),
        );
        (coordinator, RequestContext::new(user))
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_any_attempt() {
        let source = RecordingSource::ok("one", "never");
        let (coordinator, ctx) = setup(vec![source.clone()], FlakyStore::new()).await;

        let err = coordinator.answer(&ctx, AskRequest::new("   ")).await.unwrap_err();
        assert_eq!(err, ValidationError::EmptyQuery);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn success_creates_chat_and_turn() {
        let rows = FlakyStore::new();
        let source = RecordingSource::ok("one", "Paris.\nFree at llmplayground.net\n");
        let (coordinator, ctx) = setup(vec![source], rows.clone()).await;

        let reply = coordinator
            .answer(&ctx, AskRequest::new("capital of France"))
            .await
            .unwrap();
        assert!(reply.success);
        assert_eq!(reply.result, "Paris.");
        assert_eq!(reply.provider.as_deref(), Some("one"));
        let chat = reply.chat_id.unwrap();
        assert!(reply.turn_id.is_some());

        let stored = rows.chat_turns(ctx.user_id, chat).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].result, "Paris.");
    }

    #[tokio::test]
    async fn unverified_chat_id_is_not_echoed_when_chat_lookup_fails() {
        let rows = FlakyStore::new();
        let (coordinator, ctx) = setup(vec![RecordingSource::ok("one", "a")], rows.clone()).await;
        rows.fail_chats();

        let reply = coordinator
            .answer(&ctx, AskRequest::new("q").in_chat(Some(ChatId(999))))
            .await
            .unwrap();

        assert!(reply.success);
        assert_eq!(reply.result, "a");
        assert_eq!(reply.chat_id, None);
        assert_eq!(reply.turn_id, None);
        assert_eq!(rows.turn_inserts(), 0);
    }

    #[tokio::test]
    async fn given_chat_is_reused() {
        let rows = FlakyStore::new();
        let (coordinator, ctx) = setup(vec![RecordingSource::ok("one", "a")], rows.clone()).await;

        let first = coordinator.answer(&ctx, AskRequest::new("q1")).await.unwrap();
        let second = coordinator
            .answer(&ctx, AskRequest::new("q2").in_chat(first.chat_id))
            .await
            .unwrap();

        assert_eq!(first.chat_id, second.chat_id);
        assert_eq!(rows.list_chats(ctx.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replay_never_records() {
        let rows = FlakyStore::new();
        let (coordinator, ctx) = setup(vec![RecordingSource::ok("one", "a")], rows.clone()).await;

        let reply = coordinator
            .answer(&ctx, AskRequest::new("q").from_history(true))
            .await
            .unwrap();
        assert!(reply.success);
        assert_eq!(reply.turn_id, None);
        assert_eq!(rows.turn_inserts(), 0);
        assert!(rows.list_chats(ctx.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_failed_returns_fallback_and_stores_nothing() {
        let rows = FlakyStore::new();
        let (coordinator, ctx) = setup(
            vec![
                RecordingSource::err("a", ProviderError::Network("down".into())),
                RecordingSource::ok("b", "   "),
            ],
            rows.clone(),
        )
        .await;

        let reply = coordinator.answer(&ctx, AskRequest::new("q")).await.unwrap();
        assert!(!reply.success);
        assert_eq!(reply.result, "sorry");
        assert_eq!(reply.provider, None);
        assert_eq!(rows.turn_inserts(), 0);
    }

    #[tokio::test]
    async fn failed_save_still_answers() {
        let rows = FlakyStore::new();
        rows.fail_inserts();
        let (coordinator, ctx) = setup(vec![RecordingSource::ok("one", "kept")], rows.clone()).await;

        let reply = coordinator.answer(&ctx, AskRequest::new("q")).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.result, "kept");
        assert_eq!(reply.turn_id, None);
        assert!(reply.chat_id.is_some());
    }

    #[tokio::test]
    async fn context_failure_degrades_to_no_history() {
        let rows = FlakyStore::new();
        rows.fail_reads();
        let source = RecordingSource::ok("one", "fine");
        let (coordinator, ctx) = setup(vec![source.clone()], rows).await;

        let reply = coordinator.answer(&ctx, AskRequest::new("q")).await.unwrap();
        assert!(reply.success);
        let prompt = source.last_prompt().unwrap();
        assert_eq!(prompt.messages.len(), 2);
    }

    #[tokio::test]
    async fn prompt_carries_last_five_turns_oldest_first() {
        let rows = FlakyStore::new();
        let source = RecordingSource::ok("one", "ok");
        let (coordinator, ctx) = setup(vec![source.clone()], rows.clone()).await;

        let mut chat = None;
        for i in 0..7 {
            let reply = coordinator
                .answer(&ctx, AskRequest::new(format!("q{i}")).in_chat(chat))
                .await
                .unwrap();
            chat = reply.chat_id;
        }
        coordinator
            .answer(&ctx, AskRequest::new("final").detailed(true).in_chat(chat))
            .await
            .unwrap();

        let prompt = source.last_prompt().unwrap();
        let users: Vec<&str> = prompt
            .messages
            .iter()
            .filter(|m| m.role == crabai_core::message::Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            users,
            vec![
                "q2",
                "q3",
                "q4",
                "q5",
                "q6",
                "Provide a detailed explanation about: final"
            ]
        );
        assert!(prompt.detailed);
    }

    #[tokio::test]
    async fn winner_sanitized_to_empty_still_succeeds() {
        let rows = FlakyStore::new();
        let (coordinator, ctx) = setup(
            vec![RecordingSource::ok("one", "llmplayground.net")],
            rows.clone(),
        )
        .await;

        let reply = coordinator.answer(&ctx, AskRequest::new("q")).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.result, "");
        assert_eq!(rows.turn_inserts(), 1);
    }

    #[test]
    fn phases_display_snake_case() {
        assert_eq!(RequestPhase::ContextLoaded.to_string(), "context_loaded");
        assert_eq!(RequestPhase::AllFailed.to_string(), "all_failed");
    }
}
