//! Agent provider adapters.
//!
//! Each adapter shells out to its vendor CLI, streams line-delimited JSON
//! events, and normalizes them into [`crate::domain::models::AgentMessage`].
//! The shared retry policy wraps every execution.

pub mod claude;
pub mod codex;
pub mod factory;
pub mod opencode;
mod process;
pub mod retry;

pub use claude::ClaudeProvider;
pub use codex::CodexProvider;
pub use factory::create_provider;
pub use opencode::OpenCodeProvider;
pub use retry::{classify, is_rate_limit_error, is_transient_error, ErrorClass, RetryPolicy};
