//! Claude CLI provider.
//!
//! Drives the `claude` CLI in non-interactive mode with
//! `--output-format stream-json` and maps its event stream into the
//! normalized message shape.

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

pub struct ClaudeProvider {
    binary: String,
    model: Option<String>,
    retry: RetryPolicy,
}

impl ClaudeProvider {
    pub fn new(binary: Option<String>, model: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| "claude".to_string()),
            model,
            retry,
        }
    }

    fn build_command(
        &self,
        allowed_tools: &[ToolName],
        cwd: &Path,
        mcp_servers: &BTreeMap<String, McpServerConfig>,
    ) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.current_dir(cwd)
            .arg("--print")
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json");

        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        if !allowed_tools.is_empty() {
            let tools: Vec<&str> = allowed_tools.iter().map(ToolName::as_str).collect();
            cmd.arg("--allowed-tools").arg(tools.join(","));
        }
        if !mcp_servers.is_empty() {
            let servers: Value = mcp_servers
                .iter()
                .map(|(name, config)| {
                    (
                        name.clone(),
                        serde_json::json!({
                            "command": config.command,
                            "args": config.args,
                            "env": config.env,
                        }),
                    )
                })
                .collect::<serde_json::Map<String, Value>>()
                .into();
            cmd.arg("--mcp-config")
                .arg(serde_json::json!({ "mcpServers": servers }).to_string());
        }
        cmd
    }

    /// Map one stream-json line into zero or more normalized messages.
    fn convert_line(line: &str) -> Vec<AgentMessage> {
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            return Vec::new();
        };
        match event.get("type").and_then(Value::as_str) {
            Some("assistant") => {
                let blocks = event
                    .pointer("/message/content")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                blocks.iter().filter_map(Self::convert_block).collect()
            }
            Some("result") => event
                .get("result")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(|text| vec![AgentMessage::assistant(text)])
                .unwrap_or_default(),
            Some("system") => event
                .get("subtype")
                .and_then(Value::as_str)
                .map(|subtype| vec![AgentMessage::status(format!("system: {subtype}"))])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn convert_block(block: &Value) -> Option<AgentMessage> {
        match block.get("type").and_then(Value::as_str)? {
            "text" => {
                let text = block.get("text").and_then(Value::as_str)?;
                Some(AgentMessage::assistant(text))
            }
            "thinking" => {
                let text = block.get("thinking").and_then(Value::as_str)?;
                Some(AgentMessage::thought(text))
            }
            "tool_use" => {
                let name = block.get("name").and_then(Value::as_str)?;
                let input: BTreeMap<String, Value> = block
                    .get("input")
                    .and_then(Value::as_object)
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                Some(AgentMessage::tool_use(ToolName::canonicalize(name), input))
            }
            "tool_result" => {
                let content = match block.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                Some(AgentMessage::tool_result(content))
            }
            _ => None,
        }
    }

    async fn run_once(
        &self,
        prompt: &str,
        allowed_tools: &[ToolName],
        cwd: &Path,
        on_message: Option<&MessageCallback>,
        mcp_servers: &BTreeMap<String, McpServerConfig>,
    ) -> CoreResult<AgentResult> {
        let cmd = self.build_command(allowed_tools, cwd, mcp_servers);
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

        debug!(messages = messages.len(), "claude execution complete");
        Ok(AgentResult::from_messages(
            messages,
            Some(AgentInfo {
                provider: "claude".to_string(),
                model: self.model.clone(),
            }),
        ))
    }
}

#[async_trait]
impl AgentProvider for ClaudeProvider {
    async fn execute(
        &self,
        prompt: &str,
        allowed_tools: &[ToolName],
        cwd: &Path,
        on_message: Option<MessageCallback>,
        mcp_servers: &BTreeMap<String, McpServerConfig>,
    ) -> CoreResult<AgentResult> {
        self.retry
            .execute(|| self.run_once(prompt, allowed_tools, cwd, on_message.as_ref(), mcp_servers))
            .await
    }

    fn stream(
        &self,
        prompt: String,
        allowed_tools: Vec<ToolName>,
        cwd: &Path,
        mcp_servers: BTreeMap<String, McpServerConfig>,
    ) -> BoxStream<'static, CoreResult<AgentMessage>> {
        let cmd = self.build_command(&allowed_tools, cwd, &mcp_servers);
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
        "claude"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MessageRole;

    #[test]
    fn converts_text_and_tool_use_blocks() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"Let me look."},
            {"type":"tool_use","name":"Bash","input":{"command":"pytest -q"}}
        ]}}"#
            .replace('\n', "");
        let msgs = ClaudeProvider::convert_line(&line);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, MessageRole::Assistant);
        assert_eq!(msgs[1].role, MessageRole::ToolUse);
        assert_eq!(msgs[1].tool_name, Some(ToolName::Bash));
    }

    #[test]
    fn converts_result_event_to_final_assistant_message() {
        let msgs = ClaudeProvider::convert_line(r#"{"type":"result","result":"All done."}"#);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "All done.");
    }

    #[test]
    fn ignores_unknown_and_malformed_lines() {
        assert!(ClaudeProvider::convert_line("not json").is_empty());
        assert!(ClaudeProvider::convert_line(r#"{"type":"user"}"#).is_empty());
    }

    #[test]
    fn namespaced_mcp_tools_stay_namespaced() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"github:create_issue","input":{}}]}}"#;
        let msgs = ClaudeProvider::convert_line(line);
        assert_eq!(
            msgs[0].tool_name,
            Some(ToolName::External("github:create_issue".into()))
        );
    }
}
