//! Shared test helpers for coordinator tests.

use crabai_core::conversation::{Chat, ChatId, NewTurn, Turn, TurnId, User, UserId};
use crabai_core::error::{ProviderError, StoreError};
use crabai_core::provider::{AnswerPrompt, AnswerSource};
use crabai_core::store::RowStore;
use crabai_store::InMemoryStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A mock source with a fixed result that remembers the last prompt it saw.
pub struct RecordingSource {
    name: String,
    result: Result<String, ProviderError>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<AnswerPrompt>>,
}

impl RecordingSource {
    pub fn ok(name: &str, text: &str) -> Arc<Self> {
        Self::with_result(name, Ok(text.to_string()))
    }

    pub fn err(name: &str, error: ProviderError) -> Arc<Self> {
        Self::with_result(name, Err(error))
    }

    fn with_result(name: &str, result: Result<String, ProviderError>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<AnswerPrompt> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AnswerSource for RecordingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, prompt: &AnswerPrompt) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.clone());
        self.result.clone()
    }
}

/// An in-memory row store that can be told to fail and counts turn inserts.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_inserts: AtomicBool,
    fail_reads: AtomicBool,
    fail_chats: AtomicBool,
    turn_inserts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every `insert_turn` fail.
    pub fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }

    /// Make every `recent_turns` fail.
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Make every chat lookup and `insert_chat` fail.
    pub fn fail_chats(&self) {
        self.fail_chats.store(true, Ordering::SeqCst);
    }

    fn chats_down(&self) -> Result<(), StoreError> {
        if self.fail_chats.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("chats table unavailable".into()));
        }
        Ok(())
    }

    /// Number of `insert_turn` calls, successful or not.
    pub fn turn_inserts(&self) -> usize {
        self.turn_inserts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RowStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserId, StoreError> {
        self.inner.create_user(username, password_hash).await
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user(username).await
    }

    async fn insert_chat(&self, user: UserId, title: &str) -> Result<ChatId, StoreError> {
        self.chats_down()?;
        self.inner.insert_chat(user, title).await
    }

    async fn get_chat(&self, user: UserId, chat: ChatId) -> Result<Option<Chat>, StoreError> {
        self.chats_down()?;
        self.inner.get_chat(user, chat).await
    }

    async fn list_chats(&self, user: UserId) -> Result<Vec<Chat>, StoreError> {
        self.inner.list_chats(user).await
    }

    async fn insert_turn(&self, turn: NewTurn) -> Result<TurnId, StoreError> {
        self.turn_inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("disk full".into()));
        }
        self.inner.insert_turn(turn).await
    }

    async fn recent_turns(&self, user: UserId, limit: usize) -> Result<Vec<Turn>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::QueryFailed("database is locked".into()));
        }
        self.inner.recent_turns(user, limit).await
    }

    async fn chat_turns(&self, user: UserId, chat: ChatId) -> Result<Vec<Turn>, StoreError> {
        self.inner.chat_turns(user, chat).await
    }

    async fn delete_turn(&self, user: UserId, turn: TurnId) -> Result<u64, StoreError> {
        self.inner.delete_turn(user, turn).await
    }

    async fn delete_chat(&self, user: UserId, chat: ChatId) -> Result<u64, StoreError> {
        self.inner.delete_chat(user, chat).await
    }

    async fn delete_all_for_user(&self, user: UserId) -> Result<u64, StoreError> {
        self.inner.delete_all_for_user(user).await
    }
}
