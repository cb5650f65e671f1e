//! Agent provider port.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::errors::CoreResult;
use crate::domain::models::{AgentMessage, AgentResult, McpServerConfig, ToolName};

/// Callback invoked for each message as it arrives.
pub type MessageCallback = Arc<dyn Fn(&AgentMessage) + Send + Sync>;

/// Polymorphic interface to an external model-driven agent.
///
/// Implementations normalize vendor messages into [`AgentMessage`] and leave
/// retry to the shared policy wrapper; both operations are cancellable by
/// dropping the returned future/stream.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    /// Execute a prompt to completion and return the collected result.
    async fn execute(
        &self,
        prompt: &str,
        allowed_tools: &[ToolName],
        cwd: &Path,
        on_message: Option<MessageCallback>,
        mcp_servers: &BTreeMap<String, McpServerConfig>,
    ) -> CoreResult<AgentResult>;

    /// Stream messages as the agent produces them.
    fn stream(
        &self,
        prompt: String,
        allowed_tools: Vec<ToolName>,
        cwd: &Path,
        mcp_servers: BTreeMap<String, McpServerConfig>,
    ) -> BoxStream<'static, CoreResult<AgentMessage>>;

    /// Short provider name (`claude`, `codex`, `opencode`).
    fn name(&self) -> &str;
}
