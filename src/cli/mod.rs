//! Command-line interface.

pub mod commands;
pub mod interactive;
pub mod output;

use clap::{Parser, Subcommand};

use commands::mcp::McpArgs;
use commands::run::RunArgs;
use commands::task::TaskArgs;

#[derive(Parser, Debug)]
#[command(
    name = "proofloop",
    version,
    about = "Autonomous coding-task runner: drives a coding agent until your completion conditions pass"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a coding task to completion
    Run(RunArgs),
    /// Inspect, list, and resume tasks
    Task(TaskArgs),
    /// Browse and configure MCP servers
    Mcp(McpArgs),
}
