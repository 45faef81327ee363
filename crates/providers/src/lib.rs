//! Answer-source implementations for CRAB AI.
//!
//! All sources implement the `crabai_core::AnswerSource` trait.
//! The builder assembles them, in configured order, into a [`FallbackChain`].

pub mod builder;
pub mod fallback;
pub mod openai_compat;
pub mod sanitizer;
pub mod translate;
pub mod wikipedia;

pub use builder::{build_from_config, build_source, build_translator};
pub use fallback::{AttemptRecord, AttemptStatus, ChainOutcome, FallbackChain};
pub use openai_compat::OpenAiCompatSource;
pub use sanitizer::ResponseSanitizer;
pub use translate::TranslateSource;
pub use wikipedia::WikipediaSource;
