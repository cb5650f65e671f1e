//! Proofloop CLI entry point.

use anyhow::Result;
use clap::Parser;

use proofloop::cli::commands::{mcp, run, task};
use proofloop::cli::{Cli, Commands};
use proofloop::infrastructure::config::ConfigLoader;
use proofloop::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() {
    let exit_code = match dispatch().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn dispatch() -> Result<i32> {
    let cli = Cli::parse();
    let config = ConfigLoader::load()?;
    let _log_guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::Run(args) => run::handle_run(args, config).await,
        Commands::Task(args) => task::handle_task(args, config).await,
        Commands::Mcp(args) => mcp::handle_mcp(args).await,
    }
}
