//! `proofloop task` handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::interactive::InteractiveGateway;
use crate::cli::output::{print_result, print_task_status, print_task_table};
use crate::domain::models::Config;
use crate::domain::ports::{AutoApproveGateway, TaskRepository, UserGateway};
use crate::infrastructure::agent::create_provider;
use crate::infrastructure::analyzer::ProjectAnalyzer;
use crate::infrastructure::checks::CommandCheckRunner;
use crate::infrastructure::git::{default_state_dir, GitDiffAdapter};
use crate::infrastructure::persistence::JsonTaskRepository;
use crate::services::Orchestrator;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
    /// State directory (defaults to .proofloop under the current repo)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Show one task
    Status {
        /// Task id (full or unambiguous prefix)
        task_id: String,
    },
    /// List all tasks
    List,
    /// Resume an interrupted or reopened task
    Resume {
        task_id: String,
        /// Agent provider override
        #[arg(long)]
        provider: Option<String>,
        /// Skip all interactive gates
        #[arg(long)]
        auto_approve: bool,
    },
}

async fn resolve_state_dir(state_dir: Option<PathBuf>) -> Result<PathBuf> {
    match state_dir {
        Some(dir) => Ok(dir),
        None => {
            let cwd = std::env::current_dir().context("cannot determine working directory")?;
            Ok(default_state_dir(&cwd).await)
        }
    }
}

/// Match a full id or an unambiguous hex prefix against stored tasks.
async fn resolve_task_id(repo: &JsonTaskRepository, raw: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(id);
    }
    let needle = raw.to_lowercase();
    let tasks = repo.list().await?;
    let matches: Vec<Uuid> = tasks
        .iter()
        .map(|t| t.id)
        .filter(|id| id.simple().to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(anyhow!("task not found: {raw}")),
        _ => Err(anyhow!("task id prefix {raw:?} is ambiguous")),
    }
}

pub async fn handle_task(args: TaskArgs, mut config: Config) -> Result<i32> {
    let state_dir = resolve_state_dir(args.state_dir).await?;
    let repo = JsonTaskRepository::new(&state_dir);

    match args.command {
        TaskCommands::List => {
            let tasks = repo.list().await?;
            if tasks.is_empty() {
                println!("No tasks in {}", state_dir.display());
            } else {
                print_task_table(&tasks);
            }
            Ok(0)
        }
        TaskCommands::Status { task_id } => {
            let id = resolve_task_id(&repo, &task_id).await?;
            let task = repo
                .load(id)
                .await?
                .ok_or_else(|| anyhow!("task not found: {id}"))?;
            print_task_status(&task);
            Ok(0)
        }
        TaskCommands::Resume {
            task_id,
            provider,
            auto_approve,
        } => {
            if let Some(provider) = provider {
                config.provider.name = provider;
            }
            let id = resolve_task_id(&repo, &task_id).await?;

            let agent = create_provider(&config.provider, &config.retry)
                .context("invalid provider configuration")?;
            let analyzer = Arc::new(ProjectAnalyzer::new(Arc::clone(&agent)));
            let check_runner = Arc::new(CommandCheckRunner::new());
            let diff_service = Arc::new(GitDiffAdapter::new());
            let task_repo = Arc::new(JsonTaskRepository::new(&state_dir));
            let gateway: Arc<dyn UserGateway> = if auto_approve {
                Arc::new(AutoApproveGateway)
            } else {
                Arc::new(InteractiveGateway::new())
            };

            let orchestrator = Orchestrator::new(
                agent,
                analyzer,
                check_runner,
                diff_service,
                task_repo,
                gateway,
                state_dir,
                None,
                config.clone(),
            );
            let result = orchestrator.resume(id).await?;
            print_result(&result);
            Ok(result.exit_code())
        }
    }
}
