//! Request coordination for CRAB AI.
//!
//! A request is answered in five steps:
//!
//! 1. **Validate** the query (empty queries are rejected)
//! 2. **Load context** (the user's most recent turns, oldest first)
//! 3. **Run the chain** of answer sources until one produces text
//! 4. **Sanitize** the winning text
//! 5. **Persist** the turn (unless the request replays a stored one)
//!
//! Provider and store failures never turn into errors for the caller.

pub mod coordinator;
pub mod prompt;

#[cfg(test)]
mod test_helpers;

pub use coordinator::{AnswerReply, AskRequest, RequestContext, RequestCoordinator, RequestPhase};
pub use prompt::PromptBuilder;
