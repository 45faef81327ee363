//! Persistence for CRAB AI: row store backends and the conversation service.

pub mod conversation;
pub mod in_memory;
pub mod migrate;
pub mod sqlite;

pub use conversation::{ChatView, ContextPair, ConversationStore};
pub use in_memory::InMemoryStore;
pub use migrate::{MigrationReport, migrate_database};
pub use sqlite::{SchemaReport, SqliteStore};
