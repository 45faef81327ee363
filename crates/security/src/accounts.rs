//! Sign-up, log-in and log-out.

use crate::password::PasswordHasher;
use crate::session::{Session, SessionStore};
use crabai_core::conversation::UserId;
use crabai_core::error::{AuthError, Error, StoreError, ValidationError};
use crabai_core::store::RowStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Account operations over the row store and the session registry.
pub struct Accounts {
    rows: Arc<dyn RowStore>,
    hasher: PasswordHasher,
    sessions: SessionStore,
}

impl Accounts {
    pub fn new(rows: Arc<dyn RowStore>, sessions: SessionStore) -> Self {
        Self {
            rows,
            hasher: PasswordHasher::default(),
            sessions,
        }
    }

    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Register a new user.
    pub async fn signup(&self, username: &str, password: &str) -> Result<UserId, Error> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::Field {
                field: "username".into(),
                reason: "must not be empty".into(),
            }
            .into());
        }
        if password.is_empty() {
            return Err(ValidationError::Field {
                field: "password".into(),
                reason: "must not be empty".into(),
            }
            .into());
        }

        let hasher = self.hasher;
        let password = password.to_owned();
        let hash = blocking(move || hasher.hash(&password))
            .await?
            .map_err(|e| Error::Internal(e.to_string()))?;

        match self.rows.create_user(username, &hash).await {
            Ok(id) => {
                info!(user_id = %id, "User signed up");
                Ok(id)
            }
            Err(StoreError::Conflict(_)) => Err(AuthError::UsernameTaken.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify credentials and open a session. Returns the session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, Error> {
        let Some(user) = self.rows.find_user(username.trim()).await? else {
            warn!("Login for unknown user");
            return Err(AuthError::InvalidCredentials.into());
        };

        let hasher = self.hasher;
        let password = password.to_owned();
        let stored = user.password_hash.clone();
        let valid = blocking(move || hasher.verify(&password, &stored))
            .await?
            .unwrap_or_else(|e| {
                warn!(user_id = %user.id, error = %e, "Stored password hash unreadable");
                false
            });
        if !valid {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        info!(user_id = %user.id, "User logged in");
        Ok(self.sessions.open(user.id, &user.username))
    }

    pub fn logout(&self, token: &str) {
        if self.sessions.close(token) {
            info!("User logged out");
        }
    }

    /// The live session behind `token`, or [`AuthError::Unauthenticated`].
    pub fn authenticate(&self, token: Option<&str>) -> Result<Session, AuthError> {
        token
            .and_then(|t| self.sessions.resolve(t))
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Run CPU-bound hashing off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("Password task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crabai_core::conversation::{Chat, ChatId, NewTurn, Turn, TurnId, User};
    use tokio::sync::Mutex;

    /// Just enough of a row store for account tests.
    #[derive(Default)]
    struct UserTable {
        users: Mutex<Vec<User>>,
    }

    #[async_trait]
    impl RowStore for UserTable {
        fn name(&self) -> &str {
            "users_only"
        }

        async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserId, StoreError> {
            let mut users = self.users.lock().await;
            if users.iter().any(|u| u.username == username) {
                return Err(StoreError::Conflict(username.into()));
            }
            let id = UserId(users.len() as i64 + 1);
            users.push(User {
                id,
                username: username.into(),
                password_hash: password_hash.into(),
            });
            Ok(id)
        }

        async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
            Ok(self
                .users
                .lock()
                .await
                .iter()
                .find(|u| u.username == username)
                .cloned())
        }

        async fn insert_chat(&self, _: UserId, _: &str) -> Result<ChatId, StoreError> {
            unimplemented!()
        }
        async fn get_chat(&self, _: UserId, _: ChatId) -> Result<Option<Chat>, StoreError> {
            unimplemented!()
        }
        async fn list_chats(&self, _: UserId) -> Result<Vec<Chat>, StoreError> {
            unimplemented!()
        }
        async fn insert_turn(&self, _: NewTurn) -> Result<TurnId, StoreError> {
            unimplemented!()
        }
        async fn recent_turns(&self, _: UserId, _: usize) -> Result<Vec<Turn>, StoreError> {
            unimplemented!()
        }
        async fn chat_turns(&self, _: UserId, _: ChatId) -> Result<Vec<Turn>, StoreError> {
            unimplemented!()
        }
        async fn delete_turn(&self, _: UserId, _: TurnId) -> Result<u64, StoreError> {
            unimplemented!()
        }
        async fn delete_chat(&self, _: UserId, _: ChatId) -> Result<u64, StoreError> {
            unimplemented!()
        }
        async fn delete_all_for_user(&self, _: UserId) -> Result<u64, StoreError> {
            unimplemented!()
        }
    }

    fn accounts() -> Accounts {
        Accounts::new(Arc::new(UserTable::default()), SessionStore::default())
            .with_hasher(PasswordHasher::with_iterations(5))
    }

    #[tokio::test]
    async fn signup_login_logout() {
        let accounts = accounts();
        let id = accounts.signup("yahya", "secret").await.unwrap();

        let token = accounts.login("yahya", "secret").await.unwrap();
        let session = accounts.authenticate(Some(&token)).unwrap();
        assert_eq!(session.user_id, id);

        accounts.logout(&token);
        assert_eq!(
            accounts.authenticate(Some(&token)),
            Err(AuthError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn duplicate_username_is_taken() {
        let accounts = accounts();
        accounts.signup("yahya", "a").await.unwrap();
        let err = accounts.signup("yahya", "b").await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::UsernameTaken)));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let accounts = accounts();
        accounts.signup("yahya", "right").await.unwrap();

        let wrong = accounts.login("yahya", "wrong").await.unwrap_err();
        let unknown = accounts.login("nobody", "right").await.unwrap_err();
        assert!(matches!(wrong, Error::Auth(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Error::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn empty_fields_are_validation_errors() {
        let accounts = accounts();
        assert!(matches!(
            accounts.signup("  ", "pw").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            accounts.signup("name", "").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn legacy_werkzeug_hash_logs_in() {
        let rows = Arc::new(UserTable::default());
        rows.create_user(
            "legacy",
            "pbkdf2:sha256:1000$Nq3pX0aB$\
             4f46f492738654444261ca7d005a3c1f3d1fc9d99a9458f00847a853b4f9c802",
        )
        .await
        .unwrap();
        let accounts = Accounts::new(rows, SessionStore::default());

        let token = accounts.login("legacy", "hunter2").await.unwrap();
        assert_eq!(
            accounts.authenticate(Some(&token)).unwrap().username,
            "legacy"
        );
        assert!(matches!(
            accounts.login("legacy", "wrong").await,
            Err(Error::Auth(AuthError::InvalidCredentials))
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hashing_leaves_the_runtime_responsive() {
        let accounts = Arc::new(
            Accounts::new(Arc::new(UserTable::default()), SessionStore::default())
                .with_hasher(PasswordHasher::with_iterations(200_000)),
        );
        let signup = tokio::spawn({
            let accounts = accounts.clone();
            async move { accounts.signup("slow", "pw").await }
        });

        // On a single-threaded runtime this only gets to run while the hash
        // is computed elsewhere.
        let ticked = tokio::spawn(async { tokio::task::yield_now().await });
        ticked.await.unwrap();
        assert!(!signup.is_finished());
        signup.await.unwrap().unwrap();
    }

    #[test]
    fn missing_token_is_unauthenticated() {
        assert_eq!(
            accounts().authenticate(None),
            Err(AuthError::Unauthenticated)
        );
    }
}
