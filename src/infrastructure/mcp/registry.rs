//! MCP server template registry.
//!
//! Built-in templates live in a compile-time table; user-installed servers
//! are registered at runtime from `.proofloop/mcp_servers.yaml`.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::models::{McpCategory, McpServerConfig};

struct Template {
    name: &'static str,
    command: &'static str,
    args: &'static [&'static str],
    category: McpCategory,
    description: &'static str,
}

const BUILTIN_TEMPLATES: [Template; 6] = [
    Template {
        name: "filesystem",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-filesystem"],
        category: McpCategory::Development,
        description: "Scoped filesystem access beyond the workspace",
    },
    Template {
        name: "github",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-github"],
        category: McpCategory::Development,
        description: "GitHub issues, pull requests, and repository browsing",
    },
    Template {
        name: "fetch",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-fetch"],
        category: McpCategory::Web,
        description: "Fetch and convert web pages",
    },
    Template {
        name: "memory",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-memory"],
        category: McpCategory::Productivity,
        description: "Knowledge-graph memory across sessions",
    },
    Template {
        name: "sqlite",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-sqlite"],
        category: McpCategory::Data,
        description: "Query local SQLite databases",
    },
    Template {
        name: "postgres",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-postgres"],
        category: McpCategory::Data,
        description: "Query PostgreSQL databases",
    },
];

/// Registry of launchable MCP servers.
#[derive(Debug, Clone)]
pub struct McpRegistry {
    servers: BTreeMap<String, McpServerConfig>,
}

impl Default for McpRegistry {
    fn default() -> Self {
        let mut servers = BTreeMap::new();
        for template in &BUILTIN_TEMPLATES {
            servers.insert(
                template.name.to_string(),
                McpServerConfig {
                    name: template.name.to_string(),
                    command: template.command.to_string(),
                    args: template.args.iter().map(ToString::to_string).collect(),
                    env: BTreeMap::new(),
                    category: template.category,
                    description: template.description.to_string(),
                },
            );
        }
        Self { servers }
    }
}

impl McpRegistry {
    /// Built-in templates plus any user-installed servers found under the
    /// state dir.
    pub async fn load(state_dir: &Path) -> Self {
        let mut registry = Self::default();
        let path = state_dir.join("mcp_servers.yaml");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_yaml::from_str::<Vec<McpServerConfig>>(&content) {
                Ok(user_servers) => {
                    for server in user_servers {
                        registry.register(server);
                    }
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring malformed MCP server file"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read MCP server file"),
        }
        debug!(servers = registry.servers.len(), "loaded MCP registry");
        registry
    }

    /// Register or replace a server.
    pub fn register(&mut self, server: McpServerConfig) {
        self.servers.insert(server.name.clone(), server);
    }

    pub fn get(&self, name: &str) -> Option<&McpServerConfig> {
        self.servers.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &McpServerConfig> {
        self.servers.values()
    }

    pub fn by_category(&self, category: McpCategory) -> Vec<&McpServerConfig> {
        self.servers
            .values()
            .filter(|s| s.category == category)
            .collect()
    }

    /// Resolve selected names into launch configs, dropping unknown names.
    pub fn resolve(&self, names: &[String]) -> BTreeMap<String, McpServerConfig> {
        let mut resolved = BTreeMap::new();
        for name in names {
            match self.get(name) {
                Some(config) => {
                    resolved.insert(name.clone(), config.clone());
                }
                None => warn!(server = %name, "selected MCP server is not registered"),
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_present() {
        let registry = McpRegistry::default();
        assert!(registry.get("github").is_some());
        assert!(registry.get("fetch").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn resolve_drops_unknown_names() {
        let registry = McpRegistry::default();
        let resolved = registry.resolve(&["github".to_string(), "bogus".to_string()]);
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("github"));
    }

    #[test]
    fn user_servers_can_shadow_builtins() {
        let mut registry = McpRegistry::default();
        registry.register(McpServerConfig {
            name: "github".to_string(),
            command: "custom-github".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            category: McpCategory::Development,
            description: String::new(),
        });
        assert_eq!(registry.get("github").unwrap().command, "custom-github");
    }

    #[tokio::test]
    async fn load_without_user_file_is_builtin_only() {
        let dir = tempfile::tempdir().unwrap();
        let registry = McpRegistry::load(dir.path()).await;
        assert_eq!(registry.all().count(), BUILTIN_TEMPLATES.len());
    }
}
