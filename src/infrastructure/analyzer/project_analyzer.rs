//! Agent-backed project analyzer.
//!
//! Lets the agent read project configuration files and report discovered
//! verification commands, conventions, and frameworks as JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::models::{CommandKind, ProjectAnalysis, ToolName};
use crate::domain::ports::{AgentProvider, MessageCallback, ProjectAnalyzerPort};
use crate::infrastructure::utils::extract_json;

pub struct ProjectAnalyzer {
    agent: Arc<dyn AgentProvider>,
}

impl ProjectAnalyzer {
    pub fn new(agent: Arc<dyn AgentProvider>) -> Self {
        Self { agent }
    }

    fn prompt(path: &Path) -> String {
        format!(
            r#"Analyze the project at {} and return a JSON object:
{{
    "structure": {{"root_files": [...], "src_dirs": [...], "test_dirs": [...]}},
    "commands": {{
        "test": "<command>" or null,
        "lint": "<command>" or null,
        "build": "<command>" or null,
        "typecheck": "<command>" or null
    }},
    "conventions": ["<discovered convention>", ...],
    "frameworks": ["<discovered framework>", ...]
}}

Read project config files to discover the actual commands, conventions and frameworks in use.
Return ONLY the JSON, no explanation or markdown code blocks."#,
            path.display()
        )
    }

    fn parse_response(response: &str) -> ProjectAnalysis {
        let Some(data) = extract_json(response) else {
            warn!("analyzer response held no JSON; returning empty analysis");
            return ProjectAnalysis::default();
        };

        let mut commands = BTreeMap::new();
        if let Some(map) = data.get("commands").and_then(Value::as_object) {
            for kind in CommandKind::ALL {
                if let Some(cmd) = map.get(kind.as_str()).and_then(Value::as_str) {
                    if !cmd.is_empty() {
                        commands.insert(kind, cmd.to_string());
                    }
                }
            }
        }

        let structure = data
            .get("structure")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        ProjectAnalysis {
            structure,
            commands,
            conventions: string_list(data.get("conventions")),
            frameworks: string_list(data.get("frameworks")),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ProjectAnalyzerPort for ProjectAnalyzer {
    async fn analyze(&self, path: &Path, on_message: Option<MessageCallback>) -> ProjectAnalysis {
        debug!(path = %path.display(), "analyzing project");
        let result = self
            .agent
            .execute(
                &Self::prompt(path),
                &[ToolName::Read, ToolName::Glob, ToolName::Grep, ToolName::Bash],
                path,
                on_message,
                &BTreeMap::new(),
            )
            .await;

        match result {
            Ok(result) => Self::parse_response(&result.final_response),
            Err(e) => {
                warn!(error = %e, "project analysis failed; returning empty analysis");
                ProjectAnalysis::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_lists() {
        let response = r#"{
            "structure": {"root_files": ["pyproject.toml"]},
            "commands": {"test": "pytest", "lint": null, "build": "make", "typecheck": "mypy ."},
            "conventions": ["snake_case"],
            "frameworks": ["pytest"]
        }"#;
        let analysis = ProjectAnalyzer::parse_response(response);
        assert_eq!(analysis.command(CommandKind::Test), Some("pytest"));
        assert_eq!(analysis.command(CommandKind::Lint), None);
        assert_eq!(analysis.command(CommandKind::Typecheck), Some("mypy ."));
        assert_eq!(analysis.frameworks, vec!["pytest"]);
    }

    #[test]
    fn garbage_yields_empty_analysis() {
        let analysis = ProjectAnalyzer::parse_response("I could not find anything useful.");
        assert!(analysis.is_empty());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let response = "```json\n{\"commands\": {\"test\": \"cargo test\"}}\n```";
        let analysis = ProjectAnalyzer::parse_response(response);
        assert_eq!(analysis.command(CommandKind::Test), Some("cargo test"));
    }
}
