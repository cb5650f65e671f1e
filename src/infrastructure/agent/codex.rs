//! Codex CLI provider.
//!
//! Drives `codex exec --json` and maps its `msg`-wrapped event stream into
//! the normalized message shape.

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

pub struct CodexProvider {
    binary: String,
    model: Option<String>,
    retry: RetryPolicy,
}

impl CodexProvider {
    pub fn new(binary: Option<String>, model: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| "codex".to_string()),
            model,
            retry,
        }
    }

    fn build_command(&self, cwd: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("exec")
            .arg("--json")
            .arg("--skip-git-repo-check")
            .arg("--cd")
            .arg(cwd)
            // Prompt arrives on stdin.
            .arg("-");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd
    }

    /// Map one `--json` line into zero or more normalized messages.
    ///
    /// Codex wraps every event in `{"id": ..., "msg": {"type": ...}}`; shell
    /// executions arrive as begin/end pairs.
    fn convert_line(line: &str) -> Vec<AgentMessage> {
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            return Vec::new();
        };
        let Some(msg) = event.get("msg") else {
            return Vec::new();
        };
        match msg.get("type").and_then(Value::as_str) {
            Some("agent_message") => msg
                .get("message")
                .and_then(Value::as_str)
                .map(|text| vec![AgentMessage::assistant(text)])
                .unwrap_or_default(),
            Some("agent_reasoning") => msg
                .get("text")
                .and_then(Value::as_str)
                .map(|text| vec![AgentMessage::thought(text)])
                .unwrap_or_default(),
            Some("exec_command_begin") => {
                let command = match msg.get("command") {
                    Some(Value::Array(parts)) => parts
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(" "),
                    Some(Value::String(s)) => s.clone(),
                    _ => String::new(),
                };
                let input = BTreeMap::from([("command".to_string(), Value::String(command))]);
                vec![AgentMessage::tool_use(ToolName::Bash, input)]
            }
            Some("exec_command_end") => {
                let stdout = msg.get("stdout").and_then(Value::as_str).unwrap_or("");
                let stderr = msg.get("stderr").and_then(Value::as_str).unwrap_or("");
                let content = if stderr.is_empty() {
                    stdout.to_string()
                } else {
                    format!("{stdout}\n{stderr}")
                };
                vec![AgentMessage::tool_result(content)]
            }
            Some("patch_apply_begin") => {
                let input = msg
                    .get("changes")
                    .and_then(Value::as_object)
                    .map(|changes| {
                        BTreeMap::from([(
                            "file_path".to_string(),
                            Value::String(changes.keys().cloned().collect::<Vec<_>>().join(", ")),
                        )])
                    })
                    .unwrap_or_default();
                vec![AgentMessage::tool_use(ToolName::Edit, input)]
            }
            Some("task_complete") => msg
                .get("last_agent_message")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(|text| vec![AgentMessage::assistant(text)])
                .unwrap_or_default(),
            Some("error") => msg
                .get("message")
                .and_then(Value::as_str)
                .map(|text| vec![AgentMessage::status(format!("error: {text}"))])
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

        debug!(messages = messages.len(), "codex execution complete");
        Ok(AgentResult::from_messages(
            messages,
            Some(AgentInfo {
                provider: "codex".to_string(),
                model: self.model.clone(),
            }),
        ))
    }
}

#[async_trait]
impl AgentProvider for CodexProvider {
    async fn execute(
        &self,
        prompt: &str,
        _allowed_tools: &[ToolName],
        cwd: &Path,
        on_message: Option<MessageCallback>,
        _mcp_servers: &BTreeMap<String, McpServerConfig>,
    ) -> CoreResult<AgentResult> {
        // Codex tool restrictions and MCP wiring live in its own config;
        // the CLI surface takes neither per invocation.
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
        "codex"
    }
}
