//! Error types for the CRAB AI domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` wraps them all.
//!
//! Only [`AuthError`] and [`ValidationError`] ever reach the user as hard
//! rejections. Provider and store failures are converted to soft outcomes by
//! the fallback chain and the request coordinator.

use thiserror::Error;

/// The top-level error type for all CRAB AI operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A single answer source failed. The fallback chain recovers from every
/// variant by moving on to the next source.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider could not be constructed: {0}")]
    Construction(String),

    #[error("Provider panicked: {0}")]
    Panicked(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Session expired. Please log in again.")]
    Unauthenticated,

    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Username already exists.")]
    UsernameTaken,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Query must not be empty")]
    EmptyQuery,

    #[error("No text provided")]
    EmptyText,

    #[error("Invalid field '{field}': {reason}")]
    Field { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 502,
            message: "Bad gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad gateway"));
    }

    #[test]
    fn auth_error_message_is_user_facing() {
        let err = AuthError::Unauthenticated;
        assert_eq!(err.to_string(), "Session expired. Please log in again.");
    }

    #[test]
    fn store_error_converts_into_top_level() {
        let err: Error = StoreError::NotFound("chat 7".into()).into();
        assert!(matches!(err, Error::Store(StoreError::NotFound(_))));
    }
}
