//! Provider factory.

use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{ProviderConfig, RetryConfig};
use crate::domain::ports::AgentProvider;
use crate::infrastructure::agent::claude::ClaudeProvider;
use crate::infrastructure::agent::codex::CodexProvider;
use crate::infrastructure::agent::opencode::OpenCodeProvider;
use crate::infrastructure::agent::retry::RetryPolicy;

/// Known provider names, for CLI validation messages.
pub const PROVIDER_NAMES: [&str; 3] = ["claude", "codex", "opencode"];

/// Build the configured provider behind the shared retry policy.
pub fn create_provider(
    provider: &ProviderConfig,
    retry: &RetryConfig,
) -> CoreResult<Arc<dyn AgentProvider>> {
    let policy = RetryPolicy::with_caps(retry.max_rate_limit_retries, retry.max_transient_retries);
    let binary = provider.binary.clone();
    let model = provider.model.clone();
    match provider.name.to_lowercase().as_str() {
        "claude" => Ok(Arc::new(ClaudeProvider::new(binary, model, policy))),
        "codex" => Ok(Arc::new(CodexProvider::new(binary, model, policy))),
        "opencode" => Ok(Arc::new(OpenCodeProvider::new(binary, model, policy))),
        other => Err(CoreError::Provider(format!(
            "unknown provider {other:?}; expected one of {}",
            PROVIDER_NAMES.join(", ")
        ))),
    }
}
