//! Conversation persistence: bounded prompt context, lazy chat creation,
//! turn recording and owner-scoped deletes over any [`RowStore`].

use crabai_core::conversation::{Chat, ChatId, NewTurn, Turn, TurnId, UserId};
use crabai_core::error::StoreError;
use crabai_core::store::RowStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One prior exchange replayed into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPair {
    pub query: String,
    pub result: String,
}

/// Chat list plus the active thread, as shown on the app page.
#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    pub chats: Vec<Chat>,
    pub history: Vec<Turn>,
    pub active_chat_id: Option<ChatId>,
}

/// Persistence service for chats and turns.
#[derive(Clone)]
pub struct ConversationStore {
    rows: Arc<dyn RowStore>,
    context_turns: usize,
    title_max_chars: usize,
}

impl ConversationStore {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self {
            rows,
            context_turns: 5,
            title_max_chars: 30,
        }
    }

    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    pub fn with_title_max_chars(mut self, chars: usize) -> Self {
        self.title_max_chars = chars;
        self
    }

    /// The underlying row store (accounts live there too).
    pub fn rows(&self) -> &Arc<dyn RowStore> {
        &self.rows
    }

    /// The most recent turns of `user`, oldest first, at most `context_turns`.
    pub async fn context_for(&self, user: UserId) -> Result<Vec<ContextPair>, StoreError> {
        let mut recent = self.rows.recent_turns(user, self.context_turns).await?;
        recent.truncate(self.context_turns);
        recent.reverse();

        debug!(user_id = %user, turns = recent.len(), "Loaded prompt context");
        Ok(recent
            .into_iter()
            .map(|t| ContextPair {
                query: t.query,
                result: t.result,
            })
            .collect())
    }

    /// Return `chat` when it exists and is owned by `user`; otherwise create
    /// a new chat titled after `first_query`.
    pub async fn ensure_chat(
        &self,
        user: UserId,
        chat: Option<ChatId>,
        first_query: &str,
    ) -> Result<ChatId, StoreError> {
        if let Some(id) = chat {
            if self.rows.get_chat(user, id).await?.is_some() {
                return Ok(id);
            }
            warn!(user_id = %user, chat_id = %id, "Chat not found for user, starting a new one");
        }

        let title = Chat::title_from(first_query, self.title_max_chars);
        let id = self.rows.insert_chat(user, &title).await?;
        info!(user_id = %user, chat_id = %id, "Created chat");
        Ok(id)
    }

    /// Append one turn to `chat`, which must belong to `user`
    /// ([`StoreError::NotFound`] otherwise).
    pub async fn record_turn(
        &self,
        user: UserId,
        chat: ChatId,
        query: &str,
        result: &str,
    ) -> Result<TurnId, StoreError> {
        let id = self
            .rows
            .insert_turn(NewTurn {
                user_id: user,
                chat_id: Some(chat),
                query: query.to_string(),
                result: result.to_string(),
            })
            .await?;
        debug!(user_id = %user, chat_id = %chat, turn_id = %id, "Recorded turn");
        Ok(id)
    }

    pub async fn delete_turn(&self, user: UserId, turn: TurnId) -> Result<u64, StoreError> {
        let removed = self.rows.delete_turn(user, turn).await?;
        debug!(user_id = %user, turn_id = %turn, removed, "Deleted turn");
        Ok(removed)
    }

    pub async fn delete_chat(&self, user: UserId, chat: ChatId) -> Result<u64, StoreError> {
        let removed = self.rows.delete_chat(user, chat).await?;
        debug!(user_id = %user, chat_id = %chat, removed, "Deleted chat");
        Ok(removed)
    }

    pub async fn delete_all_for_user(&self, user: UserId) -> Result<u64, StoreError> {
        let removed = self.rows.delete_all_for_user(user).await?;
        info!(user_id = %user, removed, "Deleted all history");
        Ok(removed)
    }

    /// Chats of `user`, newest first.
    pub async fn chats(&self, user: UserId) -> Result<Vec<Chat>, StoreError> {
        self.rows.list_chats(user).await
    }

    /// The app page model. History is only filled for an owned chat.
    pub async fn chat_view(
        &self,
        user: UserId,
        active: Option<ChatId>,
    ) -> Result<ChatView, StoreError> {
        let chats = self.rows.list_chats(user).await?;
        let history = match active {
            Some(id) if chats.iter().any(|c| c.id == id) => self.rows.chat_turns(user, id).await?,
            _ => Vec::new(),
        };

        Ok(ChatView {
            chats,
            history,
            active_chat_id: active,
        })
    }
}
