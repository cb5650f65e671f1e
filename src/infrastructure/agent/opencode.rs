//! OpenCode CLI provider.
//!
//! Drives `opencode run --format json` and maps its part-based event stream
//! into the normalized message shape.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::domain::errors::CoreResult;
use crate::domain::models::{
    AgentInfo, AgentMessage, AgentResult, McpServerConfig, ToolName,
};
use crate::domain::ports::{AgentProvider, MessageCallback};
use crate::infrastructure::agent::process::run_cli;
use crate::infrastructure::agent::retry::RetryPolicy;

pub struct OpenCodeProvider {
    binary: String,
    model: Option<String>,
    retry: RetryPolicy,
}

impl OpenCodeProvider {
    pub fn new(binary: Option<String>, model: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| "opencode".to_string()),
            model,
            retry,
        }
    }

    fn build_command(&self, cwd: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.current_dir(cwd).arg("run").arg("--format").arg("json");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd
    }

    /// Map one JSON line into zero or more normalized messages.
    ///
    /// OpenCode emits message parts: `{"type":"text",...}`,
    /// `{"type":"tool","tool":"bash","state":{"input":...,"output":...}}`,
    /// and `{"type":"step-finish"}` markers.
    fn convert_line(line: &str) -> Vec<AgentMessage> {
        let Ok(part) = serde_json::from_str::<Value>(line) else {
            return Vec::new();
        };
        match part.get("type").and_then(Value::as_str) {
            Some("text") => part
                .get("text")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(|text| vec![AgentMessage::assistant(text)])
                .unwrap_or_default(),
            Some("reasoning") => part
                .get("text")
                .and_then(Value::as_str)
                .map(|text| vec![AgentMessage::thought(text)])
                .unwrap_or_default(),
            Some("tool") => {
                let Some(tool) = part.get("tool").and_then(Value::as_str) else {
                    return Vec::new();
                };
                let mut out = Vec::new();
                let input: BTreeMap<String, Value> = part
                    .pointer("/state/input")
                    .and_then(Value::as_object)
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                out.push(AgentMessage::tool_use(ToolName::canonicalize(tool), input));
                if let Some(output) = part.pointer("/state/output").and_then(Value::as_str) {
                    out.push(AgentMessage::tool_result(output));
                }
                out
            }
            Some("step-start" | "step-finish") => part
                .get("reason")
                .and_then(Value::as_str)
                .map(|reason| vec![AgentMessage::status(reason)])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    async fn run_once(
        &self,
        prompt: &str,
        cwd: &Path,
        on_message: Option<&MessageCallback>,
    ) -> CoreResult<AgentResult> {
        let cmd = self.build_command(cwd);
        let mut messages = Vec::new();

        run_cli(cmd, prompt, |line| {
            for msg in Self::convert_line(line) {
                if let Some(callback) = on_message {
                    callback(&msg);
                }
                messages.push(msg);
            }
        })
        .await?;

        debug!(messages = messages.len(), "opencode execution complete");
        Ok(AgentResult::from_messages(
            messages,
            Some(AgentInfo {
                provider: "opencode".to_string(),
                model: self.model.clone(),
            }),
        ))
    }
}

#[async_trait]
impl AgentProvider for OpenCodeProvider {
    async fn execute(
        &self,
        prompt: &str,
        _allowed_tools: &[ToolName],
        cwd: &Path,
        on_message: Option<MessageCallback>,
        _mcp_servers: &BTreeMap<String, McpServerConfig>,
    ) -> CoreResult<AgentResult> {
        // Tool permissions and MCP servers come from opencode.json in the
        // workspace, not the CLI surface.
        self.retry
            .execute(|| self.run_once(prompt, cwd, on_message.as_ref()))
            .await
    }

    fn stream(
        &self,
        prompt: String,
        _allowed_tools: Vec<ToolName>,
        cwd: &Path,
        _mcp_servers: BTreeMap<String, McpServerConfig>,
    ) -> BoxStream<'static, CoreResult<AgentMessage>> {
        let cmd = self.build_command(cwd);
        let (mut tx, rx) = futures::channel::mpsc::unbounded();

        tokio::spawn(async move {
            let sender = tx.clone();
            let result = run_cli(cmd, &prompt, move |line| {
                for msg in Self::convert_line(line) {
                    let _ = sender.unbounded_send(Ok(msg));
                }
            })
            .await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx.boxed()
    }

    fn name(&self) -> &str {
        "opencode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MessageRole;

    #[test]
    fn tool_part_yields_use_and_result() {
        let line = r#"{"type":"tool","tool":"bash","state":{"input":{"command":"cargo test"},"output":"ok"}}"#;
        let msgs = OpenCodeProvider::convert_line(line);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].tool_name, Some(ToolName::Bash));
        assert_eq!(msgs[1].role, MessageRole::ToolResult);
        assert_eq!(msgs[1].content, "ok");
    }

    #[test]
    fn text_and_reasoning_parts() {
        let msgs = OpenCodeProvider::convert_line(r#"{"type":"text","text":"answer"}"#);
        assert_eq!(msgs[0].role, MessageRole::Assistant);
        let msgs = OpenCodeProvider::convert_line(r#"{"type":"reasoning","text":"hmm"}"#);
        assert_eq!(msgs[0].role, MessageRole::Thought);
    }

    #[test]
    fn vendor_tool_names_are_canonicalized() {
        let line = r#"{"type":"tool","tool":"read_file","state":{"input":{"file_path":"a.py"}}}"#;
        let msgs = OpenCodeProvider::convert_line(line);
        assert_eq!(msgs[0].tool_name, Some(ToolName::Read));
    }
}
