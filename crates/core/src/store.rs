//! RowStore trait: the relational row store behind users, chats and history.
//!
//! Every chat and turn operation takes the owning [`UserId`] and must scope
//! its query by it: a row belonging to another user is invisible and can
//! never be changed. Implementations use parameterized queries only.

use async_trait::async_trait;
use crate::conversation::{Chat, ChatId, NewTurn, Turn, TurnId, User, UserId};
use crate::error::StoreError;

/// The core RowStore trait.
///
/// Implementations: SQLite, in-memory (for testing).
#[async_trait]
pub trait RowStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create a user. Fails with [`StoreError::Conflict`] if the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str)
        -> std::result::Result<UserId, StoreError>;

    /// Look a user up by username.
    async fn find_user(&self, username: &str) -> std::result::Result<Option<User>, StoreError>;

    /// Create a chat owned by `user`.
    async fn insert_chat(&self, user: UserId, title: &str) -> std::result::Result<ChatId, StoreError>;

    /// Get a chat if it exists and is owned by `user`.
    async fn get_chat(&self, user: UserId, chat: ChatId)
        -> std::result::Result<Option<Chat>, StoreError>;

    /// All chats of `user`, newest first.
    async fn list_chats(&self, user: UserId) -> std::result::Result<Vec<Chat>, StoreError>;

    /// Append one turn. A set `chat_id` must name a chat owned by the same
    /// user, otherwise nothing is written and `NotFound` is returned.
    async fn insert_turn(&self, turn: NewTurn) -> std::result::Result<TurnId, StoreError>;

    /// The `limit` most recent turns of `user` across all chats, newest first.
    async fn recent_turns(&self, user: UserId, limit: usize)
        -> std::result::Result<Vec<Turn>, StoreError>;

    /// The turns of one chat owned by `user`, oldest first.
    async fn chat_turns(&self, user: UserId, chat: ChatId)
        -> std::result::Result<Vec<Turn>, StoreError>;

    /// Delete one turn. Returns the number of rows removed.
    async fn delete_turn(&self, user: UserId, turn: TurnId) -> std::result::Result<u64, StoreError>;

    /// Delete a chat and all its turns. Returns the number of rows removed.
    async fn delete_chat(&self, user: UserId, chat: ChatId) -> std::result::Result<u64, StoreError>;

    /// Delete every turn, then every chat, of `user`. Returns the number of rows removed.
    async fn delete_all_for_user(&self, user: UserId) -> std::result::Result<u64, StoreError>;
}
