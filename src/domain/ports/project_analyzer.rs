//! Project analyzer port.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::models::ProjectAnalysis;
use crate::domain::ports::agent_provider::MessageCallback;

/// Discovers verification commands, frameworks, and conventions in a
/// workspace. Parse failures yield an empty analysis, never an error.
#[async_trait]
pub trait ProjectAnalyzerPort: Send + Sync {
    async fn analyze(&self, path: &Path, on_message: Option<MessageCallback>) -> ProjectAnalysis;
}
