//! Users, chat threads and turns: the persisted conversation model.
//!
//! A [`Chat`] is created lazily on the first successful turn of a new
//! conversation and its title is fixed at that moment. A [`Turn`] is
//! append-only and always belongs to the same user as its chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

row_id!(
    /// Row id of a user.
    UserId
);
row_id!(
    /// Row id of a chat thread.
    ChatId
);
row_id!(
    /// Row id of a history entry.
    TurnId
);

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// A conversation thread owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub user_id: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Derive a thread title from its first query: the first `max_chars`
    /// characters, followed by `...` when the query was longer.
    pub fn title_from(query: &str, max_chars: usize) -> String {
        if query.chars().count() > max_chars {
            let head: String = query.chars().take(max_chars).collect();
            format!("{head}...")
        } else {
            query.to_string()
        }
    }
}

/// One persisted (query, result) exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    pub query: String,
    pub result: String,
    pub created_at: DateTime<Utc>,
}

/// A turn that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub user_id: UserId,
    pub chat_id: Option<ChatId>,
    pub query: String,
    pub result: String,
}
