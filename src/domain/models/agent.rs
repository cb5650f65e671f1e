//! Agent messages and results, normalized across providers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message in the agent stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Assistant,
    ToolUse,
    ToolResult,
    Thought,
    Status,
}

/// Canonical tool vocabulary.
///
/// Provider-specific names are mapped into this set at the adapter boundary;
/// external MCP tools keep a `server:tool` namespaced form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ToolName {
    Read,
    Write,
    Edit,
    Bash,
    Glob,
    Grep,
    External(String),
}

impl ToolName {
    /// Canonicalize a vendor tool name. Known names match case-insensitively
    /// (`read_file` and `shell` style aliases included); anything containing
    /// a colon is treated as a namespaced external tool.
    pub fn canonicalize(raw: &str) -> Self {
        if raw.contains(':') {
            return Self::External(raw.to_string());
        }
        match raw.to_ascii_lowercase().as_str() {
            "read" | "read_file" | "view" => Self::Read,
            "write" | "write_file" | "create_file" => Self::Write,
            "edit" | "apply_patch" | "str_replace" => Self::Edit,
            "bash" | "shell" | "exec" | "run" | "local_shell" => Self::Bash,
            "glob" | "find" => Self::Glob,
            "grep" | "search" | "rg" => Self::Grep,
            _ => Self::External(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Edit => "Edit",
            Self::Bash => "Bash",
            Self::Glob => "Glob",
            Self::Grep => "Grep",
            Self::External(name) => name,
        }
    }
}

impl From<ToolName> for String {
    fn from(value: ToolName) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for ToolName {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(match value.as_str() {
            "Read" => Self::Read,
            "Write" => Self::Write,
            "Edit" => Self::Edit,
            "Bash" => Self::Bash,
            "Glob" => Self::Glob,
            "Grep" => Self::Grep,
            _ => Self::External(value),
        })
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message from the agent during execution.
///
/// Persisted verbatim to `events.jsonl`; the command tracker keeps the
/// summarized view used in prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub tool_name: Option<ToolName>,
    #[serde(default)]
    pub tool_input: Option<BTreeMap<String, Value>>,
}

impl AgentMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_name: None,
            tool_input: None,
        }
    }

    pub fn tool_use(tool: ToolName, input: BTreeMap<String, Value>) -> Self {
        Self {
            role: MessageRole::ToolUse,
            content: String::new(),
            tool_name: Some(tool),
            tool_input: Some(input),
        }
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::ToolResult,
            content: content.into(),
            tool_name: None,
            tool_input: None,
        }
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Thought,
            content: content.into(),
            tool_name: None,
            tool_input: None,
        }
    }

    pub fn status(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Status,
            content: content.into(),
            tool_name: None,
            tool_input: None,
        }
    }
}

/// Which provider and model produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Complete result of one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub messages: Vec<AgentMessage>,
    pub final_response: String,
    pub tools_used: Vec<ToolName>,
    #[serde(default)]
    pub agent_info: Option<AgentInfo>,
}

impl AgentResult {
    /// Build a result from an ordered message stream, deriving the final
    /// response and the set of tools used.
    pub fn from_messages(messages: Vec<AgentMessage>, agent_info: Option<AgentInfo>) -> Self {
        let final_response = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && !m.content.is_empty())
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let mut tools_used: Vec<ToolName> = Vec::new();
        for msg in &messages {
            if let Some(tool) = &msg.tool_name {
                if !tools_used.contains(tool) {
                    tools_used.push(tool.clone());
                }
            }
        }
        Self {
            messages,
            final_response,
            tools_used,
            agent_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_vendor_tool_names() {
        assert_eq!(ToolName::canonicalize("shell"), ToolName::Bash);
        assert_eq!(ToolName::canonicalize("READ"), ToolName::Read);
        assert_eq!(ToolName::canonicalize("apply_patch"), ToolName::Edit);
        assert_eq!(
            ToolName::canonicalize("github:create_issue"),
            ToolName::External("github:create_issue".into())
        );
    }

    #[test]
    fn final_response_is_last_nonempty_assistant_message() {
        let msgs = vec![
            AgentMessage::assistant("thinking about it"),
            AgentMessage::tool_result("ok"),
            AgentMessage::assistant("done: added greet()"),
        ];
        let result = AgentResult::from_messages(msgs, None);
        assert_eq!(result.final_response, "done: added greet()");
    }

    #[test]
    fn tools_used_deduplicates_in_order() {
        let msgs = vec![
            AgentMessage::tool_use(ToolName::Bash, BTreeMap::new()),
            AgentMessage::tool_use(ToolName::Read, BTreeMap::new()),
            AgentMessage::tool_use(ToolName::Bash, BTreeMap::new()),
        ];
        let result = AgentResult::from_messages(msgs, None);
        assert_eq!(result.tools_used, vec![ToolName::Bash, ToolName::Read]);
    }
}
