//! Command tracking across agent sessions.
//!
//! Builds a factual log of what the agent actually ran, fed into the next
//! iteration's prompt as context rather than interpretation.

use chrono::{DateTime, Utc};

use crate::domain::models::{AgentMessage, MessageRole, ToolName};

/// One tracked tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    pub tool: ToolName,
    pub command: String,
    pub output: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CommandRecord {
    /// One-line form for prompt inclusion, with a trailing output preview.
    fn format_for_prompt(&self) -> String {
        let mut line = format!("- {}: `{}`", self.tool, self.command);
        if let Some(output) = &self.output {
            let tail: String = output
                .chars()
                .rev()
                .take(200)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let preview = tail.trim();
            if !preview.is_empty() {
                let mut short: String = preview.chars().take(100).collect();
                if preview.chars().count() > 100 {
                    short.push_str("...");
                }
                line.push_str(&format!("\n   Output: {short}"));
            }
        }
        line
    }
}

/// Pairs tool-use messages with their results to build [`CommandRecord`]s.
#[derive(Debug, Default)]
pub struct CommandTracker {
    records: Vec<CommandRecord>,
    pending: Option<(ToolName, String)>,
}

impl CommandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one agent message.
    pub fn on_message(&mut self, msg: &AgentMessage) {
        match msg.role {
            MessageRole::ToolUse => self.handle_tool_use(msg),
            MessageRole::ToolResult => self.handle_tool_result(msg),
            _ => {}
        }
    }

    fn handle_tool_use(&mut self, msg: &AgentMessage) {
        let (Some(tool), Some(input)) = (&msg.tool_name, &msg.tool_input) else {
            return;
        };
        let command = match tool {
            ToolName::Bash => input.get("command").map(value_to_string),
            ToolName::Read | ToolName::Write | ToolName::Edit => {
                input.get("file_path").map(value_to_string)
            }
            ToolName::Glob | ToolName::Grep => {
                let pattern = input.get("pattern").map(value_to_string).unwrap_or_default();
                let path = input
                    .get("path")
                    .map(value_to_string)
                    .unwrap_or_else(|| ".".to_string());
                Some(format!("{pattern} in {path}"))
            }
            ToolName::External(_) => None,
        };
        if let Some(command) = command.filter(|c| !c.is_empty()) {
            self.pending = Some((tool.clone(), command));
        }
    }

    fn handle_tool_result(&mut self, msg: &AgentMessage) {
        if let Some((tool, command)) = self.pending.take() {
            self.records.push(CommandRecord {
                tool,
                command,
                output: (!msg.content.is_empty()).then(|| msg.content.clone()),
                timestamp: Utc::now(),
            });
        }
    }

    pub fn bash_records(&self) -> impl Iterator<Item = &CommandRecord> {
        self.records.iter().filter(|r| r.tool == ToolName::Bash)
    }

    pub fn all_records(&self) -> &[CommandRecord] {
        &self.records
    }

    /// Factual summary of the most recent shell commands for the next
    /// iteration's prompt.
    pub fn format_for_prompt(&self, max_commands: usize) -> String {
        let bash: Vec<&CommandRecord> = self.bash_records().collect();
        if bash.is_empty() {
            return "No shell commands were executed during implementation.".to_string();
        }
        let start = bash.len().saturating_sub(max_commands);
        let mut lines = vec!["Commands executed during implementation:".to_string()];
        for record in &bash[start..] {
            lines.push(record.format_for_prompt());
        }
        lines.join("\n")
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.pending = None;
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
