//! # CRAB AI Core
//!
//! Domain types, traits, and error definitions for the CRAB AI chat service.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: answer sources
//! ([`AnswerSource`]) and the row store ([`RowStore`]). Implementations live
//! in their respective crates, so tests can swap in mocks and the dependency
//! graph points inward.

pub mod error;
pub mod message;
pub mod provider;
pub mod conversation;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{AuthError, Error, ProviderError, Result, StoreError, ValidationError};
pub use message::{Message, Role};
pub use provider::{AnswerPrompt, AnswerSource, AttemptOutcome};
pub use conversation::{Chat, ChatId, NewTurn, Turn, TurnId, User, UserId};
pub use store::RowStore;
