//! `proofloop mcp` handlers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use crate::infrastructure::git::default_state_dir;
use crate::infrastructure::mcp::McpRegistry;

#[derive(Args, Debug)]
pub struct McpArgs {
    #[command(subcommand)]
    pub command: McpCommands,
    /// State directory (defaults to .proofloop under the current repo)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum McpCommands {
    /// List known MCP servers
    List {
        /// Filter by category
        #[arg(long)]
        category: Option<String>,
    },
    /// Write or update a user-installed server entry
    Configure {
        /// Server name
        server: String,
        /// Launch command
        #[arg(long)]
        command: Option<String>,
        /// Launch arguments
        #[arg(long)]
        args: Vec<String>,
    },
    /// List user-installed servers
    Installed,
}

async fn state_dir_or_default(state_dir: Option<PathBuf>) -> Result<PathBuf> {
    match state_dir {
        Some(dir) => Ok(dir),
        None => {
            let cwd = std::env::current_dir().context("cannot determine working directory")?;
            Ok(default_state_dir(&cwd).await)
        }
    }
}

fn user_servers_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("mcp_servers.yaml")
}

pub async fn handle_mcp(args: McpArgs) -> Result<i32> {
    let state_dir = state_dir_or_default(args.state_dir).await?;

    match args.command {
        McpCommands::List { category } => {
            let registry = McpRegistry::load(&state_dir).await;
            let filter = category
                .map(|c| {
                    crate::domain::models::McpCategory::from_str(&c)
                        .ok_or_else(|| anyhow!("unknown category: {c}"))
                })
                .transpose()?;

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Name", "Category", "Command", "Description"]);
            for server in registry.all() {
                if filter.is_some_and(|f| f != server.category) {
                    continue;
                }
                table.add_row(vec![
                    server.name.clone(),
                    server.category.as_str().to_string(),
                    format!("{} {}", server.command, server.args.join(" ")),
                    server.description.clone(),
                ]);
            }
            println!("{table}");
            Ok(0)
        }
        McpCommands::Configure {
            server,
            command,
            args: launch_args,
        } => {
            let path = user_servers_path(&state_dir);
            let mut servers: Vec<crate::domain::models::McpServerConfig> =
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => serde_yaml::from_str(&content)
                        .with_context(|| format!("malformed {}", path.display()))?,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => return Err(e.into()),
                };

            let registry = McpRegistry::load(&state_dir).await;
            let template = registry.get(&server);
            let command = command
                .or_else(|| template.map(|t| t.command.clone()))
                .ok_or_else(|| anyhow!("unknown server {server:?}; pass --command"))?;
            let launch_args = if launch_args.is_empty() {
                template.map(|t| t.args.clone()).unwrap_or_default()
            } else {
                launch_args
            };

            servers.retain(|s| s.name != server);
            servers.push(crate::domain::models::McpServerConfig {
                name: server.clone(),
                command,
                args: launch_args,
                env: BTreeMap::new(),
                category: template.map_or(crate::domain::models::McpCategory::Other, |t| {
                    t.category
                }),
                description: template.map(|t| t.description.clone()).unwrap_or_default(),
            });

            tokio::fs::create_dir_all(&state_dir).await?;
            let body = serde_yaml::to_string(&servers)?;
            tokio::fs::write(&path, body).await?;
            println!("Configured {server} in {}", path.display());
            Ok(0)
        }
        McpCommands::Installed => {
            let path = user_servers_path(&state_dir);
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    let servers: Vec<crate::domain::models::McpServerConfig> =
                        serde_yaml::from_str(&content)
                            .with_context(|| format!("malformed {}", path.display()))?;
                    if servers.is_empty() {
                        println!("No user-installed servers");
                    }
                    for server in servers {
                        println!("{} ({} {})", server.name, server.command, server.args.join(" "));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    println!("No user-installed servers");
                }
                Err(e) => return Err(e.into()),
            }
            Ok(0)
        }
    }
}
