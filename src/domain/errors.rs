//! Core error type shared across the pipeline.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the task-execution core.
///
/// Dispositions:
/// - `RateLimit` and `Transient` are retried in place by the provider retry
///   policy and only surface after the retry caps are exhausted.
/// - `Auth`, `ParseFailure`, and `Stagnation` terminate the task as Blocked.
/// - `BudgetExhausted` and `Cancelled` terminate the task as Stopped.
/// - `InvalidIdentifier`, `TaskBusy`, and `StorageCorruption` are caller
///   errors surfaced directly.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("agent output did not match the expected shape: {0}")]
    ParseFailure(String),

    #[error("no progress across {0} consecutive iterations")]
    Stagnation(u32),

    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid identifier {0:?}: must not contain '/', '\\', or '..'")]
    InvalidIdentifier(String),

    #[error("task {0} is already locked by another driver")]
    TaskBusy(Uuid),

    #[error("corrupt state at {path}: {reason}")]
    StorageCorruption { path: PathBuf, reason: String },

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error("git command failed: {0}")]
    Git(String),

    #[error("check execution failed: {0}")]
    Check(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// True when the retry policy may re-attempt the failed call in place.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit(_) | Self::Transient(_))
    }

    /// True when the error terminates the task rather than the call.
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

/// Result alias used across the core.
pub type CoreResult<T> = Result<T, CoreError>;
