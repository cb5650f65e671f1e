//! `proofloop run` handler.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use uuid::Uuid;

use crate::cli::interactive::InteractiveGateway;
use crate::cli::output::print_result;
use crate::domain::models::{Budget, Condition, ConditionRole, Config};
use crate::domain::ports::{AutoApproveGateway, UserGateway};
use crate::infrastructure::agent::create_provider;
use crate::infrastructure::analyzer::ProjectAnalyzer;
use crate::infrastructure::checks::CommandCheckRunner;
use crate::infrastructure::git::{default_state_dir, GitDiffAdapter};
use crate::infrastructure::mcp::McpRegistry;
use crate::infrastructure::persistence::JsonTaskRepository;
use crate::services::{Orchestrator, TaskInput};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What to do, in natural language
    pub description: String,
    /// Workspace directory
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
    /// Agent provider (claude, codex, opencode)
    #[arg(long)]
    pub provider: Option<String>,
    /// Wall-clock budget in hours
    #[arg(long, default_value_t = 1)]
    pub timeout: u64,
    /// Skip all interactive gates
    #[arg(long)]
    pub auto_approve: bool,
    /// Record baseline check runs before delivery
    #[arg(long)]
    pub baseline: bool,
    /// State directory (defaults to .proofloop under the enclosing repo)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
    /// Fixed task id
    #[arg(long)]
    pub task_id: Option<Uuid>,
    /// Enable MCP server selection
    #[arg(long)]
    pub allow_mcp: bool,
    /// Preselect an MCP server (repeatable)
    #[arg(long = "mcp-server")]
    pub mcp_servers: Vec<String>,
    /// Add a blocking completion condition as "<description>::<command>" or
    /// just "<description>" (repeatable)
    #[arg(long = "condition")]
    pub conditions: Vec<String>,
}

pub async fn handle_run(args: RunArgs, mut config: Config) -> Result<i32> {
    if let Some(provider) = &args.provider {
        config.provider.name = provider.clone();
    }

    let workspace = args
        .path
        .canonicalize()
        .with_context(|| format!("workspace {} does not exist", args.path.display()))?;
    let state_dir = match args.state_dir {
        Some(dir) => dir,
        None => default_state_dir(&workspace).await,
    };
    tokio::fs::create_dir_all(&state_dir)
        .await
        .with_context(|| format!("cannot create state dir {}", state_dir.display()))?;

    println!("Starting task: {}", args.description);
    println!("  workspace: {}", workspace.display());
    println!("  state dir: {}", state_dir.display());
    println!("  provider:  {}", config.provider.name);

    let agent = create_provider(&config.provider, &config.retry)
        .context("invalid provider configuration")?;
    let analyzer = Arc::new(ProjectAnalyzer::new(Arc::clone(&agent)));
    let check_runner = Arc::new(CommandCheckRunner::new());
    let diff_service = Arc::new(GitDiffAdapter::new());
    let task_repo = Arc::new(JsonTaskRepository::new(&state_dir));
    let gateway: Arc<dyn UserGateway> = if args.auto_approve {
        Arc::new(AutoApproveGateway)
    } else {
        Arc::new(InteractiveGateway::new())
    };
    let mcp_registry = if args.allow_mcp {
        Some(McpRegistry::load(&state_dir).await)
    } else {
        None
    };

    let orchestrator = Orchestrator::new(
        agent,
        analyzer,
        check_runner,
        diff_service,
        task_repo,
        gateway,
        state_dir,
        mcp_registry,
        config.clone(),
    );

    let mut input = TaskInput::new(args.description, workspace);
    input.budget = Budget {
        max_iterations: config.delivery.max_iterations,
        max_wall_clock_minutes: args.timeout * 60,
    };
    input.baseline = args.baseline;
    input.mcp_enabled = args.allow_mcp;
    input.mcp_servers = args.mcp_servers;
    input.task_id = args.task_id;
    input.conditions = args.conditions.iter().map(|raw| parse_condition(raw)).collect();

    let result = orchestrator.run(input).await?;
    print_result(&result);
    Ok(result.exit_code())
}

/// `"<description>::<command>"` or `"<description>"`; user-added conditions
/// are blocking and pre-approved.
fn parse_condition(raw: &str) -> Condition {
    match raw.split_once("::") {
        Some((description, command)) => {
            Condition::user_added(description.trim(), ConditionRole::Blocking)
                .with_check_command(command.trim())
        }
        None => Condition::user_added(raw.trim(), ConditionRole::Blocking),
    }
}
