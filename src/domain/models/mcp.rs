//! MCP server configuration and selection types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category of an MCP server template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpCategory {
    Development,
    Data,
    Web,
    Productivity,
    Other,
}

impl McpCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Data => "data",
            Self::Web => "web",
            Self::Productivity => "productivity",
            Self::Other => "other",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" => Some(Self::Development),
            "data" => Some(Self::Data),
            "web" => Some(Self::Web),
            "productivity" => Some(Self::Productivity),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Launch configuration for one MCP server, as handed to the agent provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_category")]
    pub category: McpCategory,
    #[serde(default)]
    pub description: String,
}

fn default_category() -> McpCategory {
    McpCategory::Other
}

/// A server the agent proposed as relevant to the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpSuggestion {
    pub server: String,
    pub reason: String,
}
