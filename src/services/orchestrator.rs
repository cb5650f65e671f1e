//! Top-level orchestration: `run` and `resume`.
//!
//! The orchestrator owns the per-task lock, drives the stage machine,
//! persists every transition, and reifies the terminal state into
//! `final/final_result.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    Budget, Condition, Config, MultiRepoDiffResult, Stage, StageOutcome, Task, TaskRunResult,
    TaskStatus, TerminalReason, TimelineEvent,
};
use crate::domain::ports::{
    AgentProvider, CheckRunner, DiffService, ProjectAnalyzerPort, TaskRepository, UserGateway,
};
use crate::infrastructure::mcp::McpRegistry;
use crate::infrastructure::persistence::{ArtifactStore, EvidenceStore, TaskLockManager, TaskPaths};
use crate::services::context::RunContext;
use crate::services::multi_repo::MultiRepoManager;
use crate::services::stage_runner::StageRunner;

/// Caller-supplied description of a task to run.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub description: String,
    pub workspace: PathBuf,
    /// Additional source roots beyond the workspace.
    pub extra_sources: Vec<PathBuf>,
    pub goals: Vec<String>,
    pub constraints: Vec<String>,
    /// User-supplied conditions; these start approved.
    pub conditions: Vec<Condition>,
    pub budget: Budget,
    /// Record baseline check runs before delivery.
    pub baseline: bool,
    pub mcp_enabled: bool,
    /// Preselected MCP server names.
    pub mcp_servers: Vec<String>,
    /// Fixed task id, for reproducible runs.
    pub task_id: Option<Uuid>,
}

impl TaskInput {
    pub fn new(description: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            description: description.into(),
            workspace: workspace.into(),
            extra_sources: Vec::new(),
            goals: Vec::new(),
            constraints: Vec::new(),
            conditions: Vec::new(),
            budget: Budget::default(),
            baseline: false,
            mcp_enabled: false,
            mcp_servers: Vec::new(),
            task_id: None,
        }
    }
}

pub struct Orchestrator {
    diff_service: Arc<dyn DiffService>,
    task_repo: Arc<dyn TaskRepository>,
    gateway: Arc<dyn UserGateway>,
    stage_runner: StageRunner,
    artifacts: ArtifactStore,
    paths: TaskPaths,
    locks: TaskLockManager,
    repo_discovery: MultiRepoManager,
    cancel: watch::Receiver<bool>,
    _cancel_keepalive: Option<watch::Sender<bool>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: Arc<dyn AgentProvider>,
        analyzer: Arc<dyn ProjectAnalyzerPort>,
        check_runner: Arc<dyn CheckRunner>,
        diff_service: Arc<dyn DiffService>,
        task_repo: Arc<dyn TaskRepository>,
        gateway: Arc<dyn UserGateway>,
        state_dir: PathBuf,
        mcp_registry: Option<McpRegistry>,
        config: Config,
    ) -> Self {
        let artifacts = ArtifactStore::new(&state_dir);
        let evidence = EvidenceStore::new(&state_dir);
        let stage_runner = StageRunner::new(
            agent,
            analyzer,
            check_runner,
            Arc::clone(&diff_service),
            Arc::clone(&task_repo),
            Arc::clone(&gateway),
            artifacts.clone(),
            evidence,
            mcp_registry,
            config,
        );
        // Without an external cancellation source the channel never fires;
        // the sender is parked here to keep the receiver alive.
        let (tx, rx) = watch::channel(false);
        Self {
            diff_service,
            task_repo,
            gateway,
            stage_runner,
            artifacts,
            paths: TaskPaths::new(&state_dir),
            locks: TaskLockManager::new(),
            repo_discovery: MultiRepoManager::default(),
            cancel: rx,
            _cancel_keepalive: Some(tx),
        }
    }

    /// Wire an external cancellation signal.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self._cancel_keepalive = None;
        self
    }

    /// Run a new task through the whole pipeline.
    pub async fn run(&self, input: TaskInput) -> CoreResult<TaskRunResult> {
        let mut task = Task::new(input.description.clone(), input.workspace.clone());
        if let Some(id) = input.task_id {
            task.id = id;
        }
        task.sources.extend(input.extra_sources.clone());
        task.goals = input.goals.clone();
        task.constraints = input.constraints.clone();
        task.conditions = input.conditions.clone();
        task.budget = input.budget;

        let _lock = self.locks.acquire(&self.paths, task.id)?;
        info!(task_id = %task.id, description = %task.description, "starting task");

        let workspace = self.repo_discovery.discover(&input.workspace).await?;
        task.status = TaskStatus::Executing;
        self.task_repo.save(&task).await?;

        let mut ctx = RunContext::new(task, workspace, self.cancel.clone());
        ctx.baseline = input.baseline;
        ctx.mcp_enabled = input.mcp_enabled;
        ctx.preselected_mcp = input.mcp_servers.clone();

        self.run_pipeline(ctx, Stage::Intake).await
    }

    /// Resume a task from its persisted timeline.
    pub async fn resume(&self, task_id: Uuid) -> CoreResult<TaskRunResult> {
        let mut task = self
            .task_repo
            .load(task_id)
            .await?
            .ok_or(CoreError::TaskNotFound(task_id))?;

        let _lock = self.locks.acquire(&self.paths, task.id)?;
        info!(task_id = %task.id, status = task.status.as_str(), "resuming task");

        let workspace_path = task
            .workspace()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        let workspace = self.repo_discovery.discover(&workspace_path).await?;

        let events = self.artifacts.read_timeline(task.id).await?;
        let start_stage = resume_stage(&events, &task);

        task.status = TaskStatus::Executing;
        task.terminal_reason = None;
        task.touch();
        self.task_repo.save(&task).await?;

        let mut ctx = RunContext::new(task, workspace, self.cancel.clone());
        self.restore_cached_context(&mut ctx).await;

        info!(task_id = %ctx.task.id, stage = %start_stage, "resume entry point determined");
        self.run_pipeline(ctx, start_stage).await
    }

    /// Rebuild agent-derived context from the per-task cache so replayed
    /// stages are skipped rather than re-queried.
    async fn restore_cached_context(&self, ctx: &mut RunContext) {
        if let Ok(Some(value)) = self.artifacts.load_cache(ctx.task.id, "strategy").await {
            ctx.strategy = value
                .get("rationale")
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string);
        }
        if let Ok(Some(value)) = self.artifacts.load_cache(ctx.task.id, "inventory").await {
            if let Ok(inventory) = serde_json::from_value(value) {
                ctx.inventory = inventory;
            }
        }
    }

    async fn run_pipeline(
        &self,
        mut ctx: RunContext,
        start_stage: Stage,
    ) -> CoreResult<TaskRunResult> {
        let mut stage = start_stage;
        let reason = loop {
            let stage_timer = Instant::now();
            let started_at = Utc::now();
            self.gateway.on_stage(stage, true, std::time::Duration::ZERO);

            let outcome = match self.stage_runner.run_stage(stage, &mut ctx).await {
                Ok(outcome) => outcome,
                Err(err) => match terminal_reason_for(&err) {
                    Some(reason) => {
                        error!(task_id = %ctx.task.id, stage = %stage, error = %err, "stage failed");
                        ctx.terminal_detail = Some(err.to_string());
                        StageOutcome::Stop { reason }
                    }
                    None => return Err(err),
                },
            };

            self.artifacts
                .append_timeline(
                    ctx.task.id,
                    &TimelineEvent::Stage {
                        stage,
                        started_at,
                        ended_at: Utc::now(),
                        outcome: outcome.label(),
                        duration_ms: stage_timer.elapsed().as_millis() as u64,
                    },
                )
                .await?;
            self.gateway.on_stage(stage, false, stage_timer.elapsed());

            match outcome {
                StageOutcome::Continue => match stage.next() {
                    Some(next) => stage = next,
                    None => break TerminalReason::Completed,
                },
                StageOutcome::Loop { stage: target, .. } => stage = target,
                StageOutcome::Gate => {
                    // Gates are recorded inside stages; a bare Gate outcome
                    // means the stage could not finish without input that
                    // never arrived.
                    break TerminalReason::Cancelled;
                }
                StageOutcome::Stop { reason } => break reason,
            }
        };

        self.finalize(ctx, reason).await
    }

    /// Write the terminal record and release the task.
    async fn finalize(&self, mut ctx: RunContext, reason: TerminalReason) -> CoreResult<TaskRunResult> {
        let status = reason.status();
        let detail = ctx
            .terminal_detail
            .take()
            .unwrap_or_else(|| reason.as_str().to_string());

        let diff = match self
            .diff_service
            .worktree_diff_all(&ctx.workspace.repos)
            .await
        {
            Ok(diff) => diff,
            Err(_) => MultiRepoDiffResult::default(),
        };

        let conditions_passed: Vec<String> = ctx
            .task
            .conditions
            .iter()
            .filter(|c| c.is_passing())
            .map(|c| c.description.clone())
            .collect();
        let conditions_failed: Vec<String> = ctx
            .task
            .conditions
            .iter()
            .filter(|c| c.gates_completion() && !c.is_passing())
            .map(|c| c.description.clone())
            .collect();

        let result = TaskRunResult {
            task_id: ctx.task.id,
            status,
            reason: reason.clone(),
            detail: detail.clone(),
            iterations: ctx.task.iterations.len() as u32,
            conditions_passed,
            conditions_failed,
            files_changed: diff.total_files_changed,
            insertions: diff.total_insertions,
            deletions: diff.total_deletions,
        };

        let final_json = json!({
            "task_id": ctx.task.id,
            "status": status.as_str(),
            "reason": reason.as_str(),
            "detail": detail,
            "iterations": result.iterations,
            "conditions_passed": result.conditions_passed,
            "conditions_failed": result.conditions_failed,
            "files_changed": result.files_changed,
            "insertions": result.insertions,
            "deletions": result.deletions,
            "finished_at": Utc::now().to_rfc3339(),
        });
        self.artifacts
            .save_final_result(
                ctx.task.id,
                &final_json,
                &diff.combined_diff(),
                &diff.combined_patch(),
            )
            .await?;

        self.artifacts
            .append_timeline(
                ctx.task.id,
                &TimelineEvent::Terminal {
                    status,
                    reason: reason.clone(),
                    at: Utc::now(),
                    stagnation_count: ctx.stagnation_count,
                },
            )
            .await?;

        ctx.task.status = status;
        ctx.task.terminal_reason = Some(reason);
        ctx.task.touch();
        self.task_repo.save(&ctx.task).await?;

        info!(
            task_id = %ctx.task.id,
            status = status.as_str(),
            iterations = result.iterations,
            "task finished"
        );
        Ok(result)
    }
}

/// Map stage errors onto terminal reasons; None means the error is a caller
/// error and propagates as Err.
fn terminal_reason_for(err: &CoreError) -> Option<TerminalReason> {
    match err {
        CoreError::Auth(_) => Some(TerminalReason::Auth),
        CoreError::ParseFailure(_) => Some(TerminalReason::ParseFailure),
        CoreError::Stagnation(_) => Some(TerminalReason::Stagnated),
        CoreError::BudgetExhausted(_) => Some(TerminalReason::Budget),
        CoreError::Cancelled => Some(TerminalReason::Cancelled),
        CoreError::RateLimit(_) | CoreError::Transient(_) | CoreError::Provider(_) => {
            Some(TerminalReason::ProviderError)
        }
        _ => None,
    }
}

/// Where resume should re-enter the pipeline.
fn resume_stage(events: &[crate::domain::models::TimelineEvent], task: &Task) -> Stage {
    use crate::domain::models::TimelineEvent as Event;

    let last_stage_event = events.iter().rev().find_map(|event| match event {
        Event::Stage { stage, outcome, .. } => Some((*stage, outcome.clone())),
        _ => None,
    });

    let mut stage = match last_stage_event {
        None => Stage::Intake,
        Some((stage, outcome)) => {
            if outcome == "gate" {
                stage
            } else if let Some(target) = outcome.strip_prefix("loop:") {
                Stage::from_str(target).unwrap_or(stage)
            } else if outcome == "continue" {
                stage.next().unwrap_or(Stage::Delivery)
            } else {
                // A stop outcome: the user is reopening a terminal task;
                // re-enter delivery for a fresh attempt.
                Stage::Delivery
            }
        }
    };

    // Sanity fallbacks for state the chosen stage depends on.
    let index = |s: Stage| Stage::ORDER.iter().position(|o| *o == s).unwrap_or(0);
    if index(stage) > index(Stage::Planning) && task.plan.is_none() {
        stage = Stage::Planning;
    }
    stage
}
