//! In-memory row store: useful for testing and throwaway servers.

use async_trait::async_trait;
use chrono::Utc;
use crabai_core::conversation::{Chat, ChatId, NewTurn, Turn, TurnId, User, UserId};
use crabai_core::error::StoreError;
use crabai_core::store::RowStore;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    chats: Vec<Chat>,
    turns: Vec<Turn>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A row store that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RowStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserId, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == username) {
            return Err(StoreError::Conflict(format!(
                "username '{username}' already exists"
            )));
        }
        let id = UserId(tables.next_id());
        tables.users.push(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(id)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn insert_chat(&self, user: UserId, title: &str) -> Result<ChatId, StoreError> {
        let mut tables = self.tables.write().await;
        let id = ChatId(tables.next_id());
        tables.chats.push(Chat {
            id,
            user_id: user,
            title: title.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_chat(&self, user: UserId, chat: ChatId) -> Result<Option<Chat>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chats
            .iter()
            .find(|c| c.id == chat && c.user_id == user)
            .cloned())
    }

    async fn list_chats(&self, user: UserId) -> Result<Vec<Chat>, StoreError> {
        let tables = self.tables.read().await;
        let mut chats: Vec<Chat> = tables
            .chats
            .iter()
            .filter(|c| c.user_id == user)
            .cloned()
            .collect();
        chats.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(chats)
    }

    async fn insert_turn(&self, turn: NewTurn) -> Result<TurnId, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(chat) = turn.chat_id {
            if !tables
                .chats
                .iter()
                .any(|c| c.id == chat && c.user_id == turn.user_id)
            {
                return Err(StoreError::NotFound(format!(
                    "chat {chat} of user {}",
                    turn.user_id
                )));
            }
        }
        let id = TurnId(tables.next_id());
        tables.turns.push(Turn {
            id,
            user_id: turn.user_id,
            chat_id: turn.chat_id,
            query: turn.query,
            result: turn.result,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn recent_turns(&self, user: UserId, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let tables = self.tables.read().await;
        let mut turns: Vec<Turn> = tables
            .turns
            .iter()
            .filter(|t| t.user_id == user)
            .cloned()
            .collect();
        turns.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        turns.truncate(limit);
        Ok(turns)
    }

    async fn chat_turns(&self, user: UserId, chat: ChatId) -> Result<Vec<Turn>, StoreError> {
        let tables = self.tables.read().await;
        let mut turns: Vec<Turn> = tables
            .turns
            .iter()
            .filter(|t| t.user_id == user && t.chat_id == Some(chat))
            .cloned()
            .collect();
        turns.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(turns)
    }

    async fn delete_turn(&self, user: UserId, turn: TurnId) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.turns.len();
        tables.turns.retain(|t| !(t.id == turn && t.user_id == user));
        Ok((before - tables.turns.len()) as u64)
    }

    async fn delete_chat(&self, user: UserId, chat: ChatId) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.turns.len() + tables.chats.len();
        tables
            .turns
            .retain(|t| !(t.chat_id == Some(chat) && t.user_id == user));
        tables.chats.retain(|c| !(c.id == chat && c.user_id == user));
        Ok((before - tables.turns.len() - tables.chats.len()) as u64)
    }

    async fn delete_all_for_user(&self, user: UserId) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.turns.len() + tables.chats.len();
        tables.turns.retain(|t| t.user_id != user);
        tables.chats.retain(|c| c.user_id != user);
        Ok((before - tables.turns.len() - tables.chats.len()) as u64)
    }
}
