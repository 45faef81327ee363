//! SQLite row store.
//!
//! Uses a single SQLite database file with three tables:
//! - `users`: accounts with unique usernames
//! - `chats`: conversation threads, owned by a user
//! - `history`: turns, owned by a user and optionally a chat
//!
//! The schema matches databases created by earlier releases. Those releases
//! had no `history.chat_id`; opening such a file adds the column in place.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use crabai_core::conversation::{Chat, ChatId, NewTurn, Turn, TurnId, User, UserId};
use crabai_core::error::StoreError;
use crabai_core::store::RowStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// What schema setup had to do when the store was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// `history.chat_id` was missing and has been added
    pub added_chat_id: bool,
}

/// A production SQLite row store.
pub struct SqliteStore {
    pool: SqlitePool,
    schema: SchemaReport,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Storage(format!("Create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .foreign_keys(true);

        let store = Self::connect(options, max_connections).await?;
        info!("SQLite row store initialized at {}", path.display());
        Ok(store)
    }

    /// Open from a connection URL such as `sqlite::memory:`.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        Self::connect(options, max_connections).await
    }

    /// An ephemeral in-process database (useful for tests).
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new("sqlite::memory:", 1).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let mut store = Self {
            pool,
            schema: SchemaReport::default(),
        };
        store.schema = store.run_migrations().await?;
        Ok(store)
    }

    /// What schema setup did on open.
    pub fn schema_report(&self) -> SchemaReport {
        self.schema
    }

    /// Create tables and indexes, upgrading a pre-chat `history` table.
    async fn run_migrations(&self) -> Result<SchemaReport, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("users table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id   INTEGER,
                title     TEXT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("chats table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id   INTEGER,
                chat_id   INTEGER,
                query     TEXT,
                result    TEXT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users (id),
                FOREIGN KEY (chat_id) REFERENCES chats (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("history table: {e}")))?;

        let columns: Vec<String> = sqlx::query("PRAGMA table_info(history)")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("history columns: {e}")))?
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .collect();

        let mut report = SchemaReport::default();
        if !columns.iter().any(|c| c == "chat_id") {
            sqlx::query("ALTER TABLE history ADD COLUMN chat_id INTEGER REFERENCES chats(id)")
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("add history.chat_id: {e}")))?;
            info!("Added chat_id column to history table");
            report.added_chat_id = true;
        }

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_history_user_ts ON history(user_id, timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_history_chat ON history(chat_id)",
            "CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id)",
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("index: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(report)
    }

    /// `CURRENT_TIMESTAMP` is stored as `YYYY-MM-DD HH:MM:SS` in UTC.
    fn parse_timestamp(raw: Option<String>) -> DateTime<Utc> {
        raw.and_then(|s| {
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
                .or_else(|| {
                    DateTime::parse_from_rfc3339(&s)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc))
                })
        })
        .unwrap_or_else(Utc::now)
    }

    fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> Result<Chat, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: i64 = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let title: Option<String> = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let timestamp: Option<String> = row.try_get("timestamp").unwrap_or(None);

        Ok(Chat {
            id: ChatId(id),
            user_id: UserId(user_id),
            title: title.unwrap_or_default(),
            created_at: Self::parse_timestamp(timestamp),
        })
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: i64 = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let chat_id: Option<i64> = row
            .try_get("chat_id")
            .map_err(|e| StoreError::QueryFailed(format!("chat_id column: {e}")))?;
        let query: Option<String> = row
            .try_get("query")
            .map_err(|e| StoreError::QueryFailed(format!("query column: {e}")))?;
        let result: Option<String> = row
            .try_get("result")
            .map_err(|e| StoreError::QueryFailed(format!("result column: {e}")))?;
        let timestamp: Option<String> = row.try_get("timestamp").unwrap_or(None);

        Ok(Turn {
            id: TurnId(id),
            user_id: UserId(user_id),
            chat_id: chat_id.map(ChatId),
            query: query.unwrap_or_default(),
            result: result.unwrap_or_default(),
            created_at: Self::parse_timestamp(timestamp),
        })
    }
}

#[async_trait]
impl RowStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserId, StoreError> {
        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?1, ?2)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Conflict(format!("username '{username}' already exists"))
                }
                other => StoreError::Storage(format!("INSERT user failed: {other}")),
            })?;

        Ok(UserId(result.last_insert_rowid()))
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, username, password_hash FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT user: {e}")))?;

        row.map(|r| {
            Ok(User {
                id: UserId(
                    r.try_get("id")
                        .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
                ),
                username: r
                    .try_get("username")
                    .map_err(|e| StoreError::QueryFailed(format!("username column: {e}")))?,
                password_hash: r
                    .try_get("password_hash")
                    .map_err(|e| StoreError::QueryFailed(format!("password_hash column: {e}")))?,
            })
        })
        .transpose()
    }

    async fn insert_chat(&self, user: UserId, title: &str) -> Result<ChatId, StoreError> {
        let result = sqlx::query("INSERT INTO chats (user_id, title) VALUES (?1, ?2)")
            .bind(user.0)
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT chat failed: {e}")))?;

        let id = ChatId(result.last_insert_rowid());
        debug!(user_id = %user, chat_id = %id, "Created chat");
        Ok(id)
    }

    async fn get_chat(&self, user: UserId, chat: ChatId) -> Result<Option<Chat>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, timestamp FROM chats WHERE id = ?1 AND user_id = ?2",
        )
        .bind(chat.0)
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT chat: {e}")))?;

        row.as_ref().map(Self::row_to_chat).transpose()
    }

    async fn list_chats(&self, user: UserId) -> Result<Vec<Chat>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, timestamp FROM chats WHERE user_id = ?1 \
             ORDER BY timestamp DESC, id DESC",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT chats: {e}")))?;

        rows.iter().map(Self::row_to_chat).collect()
    }

    async fn insert_turn(&self, turn: NewTurn) -> Result<TurnId, StoreError> {
        // A chat id must name a chat of the same user.
        let result = sqlx::query(
            "INSERT INTO history (user_id, chat_id, query, result) \
             SELECT ?1, ?2, ?3, ?4 \
             WHERE ?2 IS NULL OR EXISTS (SELECT 1 FROM chats WHERE id = ?2 AND user_id = ?1)",
        )
        .bind(turn.user_id.0)
        .bind(turn.chat_id.map(|c| c.0))
        .bind(&turn.query)
        .bind(&turn.result)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT history failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "chat {:?} of user {}",
                turn.chat_id, turn.user_id
            )));
        }
        Ok(TurnId(result.last_insert_rowid()))
    }

    async fn recent_turns(&self, user: UserId, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, chat_id, query, result, timestamp FROM history \
             WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )
        .bind(user.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT recent history: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn chat_turns(&self, user: UserId, chat: ChatId) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, chat_id, query, result, timestamp FROM history \
             WHERE chat_id = ?1 AND user_id = ?2 ORDER BY timestamp ASC, id ASC",
        )
        .bind(chat.0)
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT chat history: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn delete_turn(&self, user: UserId, turn: TurnId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM history WHERE id = ?1 AND user_id = ?2")
            .bind(turn.0)
            .bind(user.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE history failed: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn delete_chat(&self, user: UserId, chat: ChatId) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let turns = sqlx::query("DELETE FROM history WHERE chat_id = ?1 AND user_id = ?2")
            .bind(chat.0)
            .bind(user.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE chat history failed: {e}")))?;

        let chats = sqlx::query("DELETE FROM chats WHERE id = ?1 AND user_id = ?2")
            .bind(chat.0)
            .bind(user.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE chat failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(turns.rows_affected() + chats.rows_affected())
    }

    async fn delete_all_for_user(&self, user: UserId) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let turns = sqlx::query("DELETE FROM history WHERE user_id = ?1")
            .bind(user.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE all history failed: {e}")))?;

        let chats = sqlx::query("DELETE FROM chats WHERE user_id = ?1")
            .bind(user.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE all chats failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(turns.rows_affected() + chats.rows_affected())
    }
}
