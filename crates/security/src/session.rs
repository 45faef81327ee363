//! Login sessions.
//!
//! A session is an opaque random token mapped to the signed-in user. Tokens
//! expire after a fixed time-to-live; an expired token is dropped the first
//! time it is looked up.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use crabai_core::conversation::UserId;
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "crabai_session";

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// In-process session registry.
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl_minutes(minutes: u64) -> Self {
        const MAX_MINUTES: u64 = 60 * 24 * 365 * 100;
        Self::new(Duration::minutes(minutes.min(MAX_MINUTES) as i64))
    }

    /// Start a session and return its token.
    pub fn open(&self, user_id: UserId, username: &str) -> String {
        let token = new_token();
        let session = Session {
            user_id,
            username: username.to_string(),
            expires_at: Utc::now() + self.ttl,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.len() > 10_000 {
            let now = Utc::now();
            sessions.retain(|_, s| s.expires_at > now);
        }
        sessions.insert(token.clone(), session);
        debug!(user_id = %user_id, "Session opened");
        token
    }

    /// The live session for `token`, if any.
    pub fn resolve(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            match sessions.get(token) {
                Some(s) if s.expires_at > now => return Some(s.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token);
        debug!("Expired session dropped");
        None
    }

    /// End a session. Returns whether it existed.
    pub fn close(&self, token: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_resolve_close() {
        let store = SessionStore::default();
        let token = store.open(UserId(7), "yahya");

        let session = store.resolve(&token).unwrap();
        assert_eq!(session.user_id, UserId(7));
        assert_eq!(session.username, "yahya");

        assert!(store.close(&token));
        assert!(store.resolve(&token).is_none());
        assert!(!store.close(&token));
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let store = SessionStore::default();
        let a = store.open(UserId(1), "a");
        let b = store.open(UserId(1), "a");
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn expired_session_is_dropped() {
        let store = SessionStore::new(Duration::seconds(-1));
        let token = store.open(UserId(1), "a");
        assert_eq!(store.len(), 1);
        assert!(store.resolve(&token).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_token_resolves_to_none() {
        assert!(SessionStore::default().resolve("nope").is_none());
    }
}
