//! Project analysis returned by the verification inventory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of verification commands discovered in a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Test,
    Lint,
    Build,
    Typecheck,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [Self::Test, Self::Lint, Self::Build, Self::Typecheck];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Lint => "lint",
            Self::Build => "build",
            Self::Typecheck => "typecheck",
        }
    }
}

/// What the analyzer discovered about a workspace.
///
/// Parse failures yield `ProjectAnalysis::default()`, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectAnalysis {
    /// Free-form structure description (root files, src dirs, test dirs).
    #[serde(default)]
    pub structure: BTreeMap<String, Value>,
    /// Discovered commands; absent kinds were not found.
    #[serde(default)]
    pub commands: BTreeMap<CommandKind, String>,
    #[serde(default)]
    pub conventions: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
}

impl ProjectAnalysis {
    pub fn command(&self, kind: CommandKind) -> Option<&str> {
        self.commands.get(&kind).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_empty()
            && self.commands.is_empty()
            && self.conventions.is_empty()
            && self.frameworks.is_empty()
    }

    /// One-line summary for prompts and display.
    pub fn summary(&self) -> String {
        let cmds: Vec<String> = CommandKind::ALL
            .iter()
            .filter_map(|k| self.command(*k).map(|c| format!("{}={c}", k.as_str())))
            .collect();
        if cmds.is_empty() {
            "no verification commands discovered".to_string()
        } else {
            cmds.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_discovered_commands() {
        let mut analysis = ProjectAnalysis::default();
        analysis
            .commands
            .insert(CommandKind::Test, "pytest".to_string());
        analysis
            .commands
            .insert(CommandKind::Lint, "ruff check .".to_string());
        assert_eq!(analysis.summary(), "test=pytest, lint=ruff check .");
    }

    #[test]
    fn empty_analysis_reports_nothing_found() {
        assert!(ProjectAnalysis::default().is_empty());
        assert_eq!(
            ProjectAnalysis::default().summary(),
            "no verification commands discovered"
        );
    }
}
