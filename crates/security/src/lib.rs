//! Accounts and sessions for CRAB AI.
//!
//! Provides:
//! - **Passwords**: salted PBKDF2-HMAC-SHA256 hashes
//! - **Sessions**: opaque expiring tokens mapped to users
//! - **Accounts**: sign-up, log-in and log-out over the row store

pub mod accounts;
pub mod password;
pub mod session;

pub use accounts::Accounts;
pub use password::{PasswordError, PasswordHasher};
pub use session::{SESSION_COOKIE, Session, SessionStore};
