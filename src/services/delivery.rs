//! The delivery iteration loop.
//!
//! Runs {snapshot, drive agent, capture diff, run checks, decide outcome}
//! until every blocking condition passes or a stop condition fires.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    AgentResult, CheckResult, CheckSpec, CheckStatus, DeliveryConfig, Iteration,
    IterationOutcome, MessageRole, TerminalReason, TimelineEvent, ToolName,
};
use crate::domain::ports::{
    AgentProvider, CheckRunner, DiffService, MessageCallback, TaskRepository, UserGateway,
};
use crate::infrastructure::persistence::{ArtifactStore, EvidenceStore, SnapshotManifest};
use crate::services::context::{wait_cancelled, RunContext};
use crate::services::prompts::{delivery_prompt, DeliveryPromptContext};

/// Tools the implementation agent may use.
const DELIVERY_TOOLS: [ToolName; 6] = [
    ToolName::Read,
    ToolName::Write,
    ToolName::Edit,
    ToolName::Bash,
    ToolName::Glob,
    ToolName::Grep,
];

/// Stash handles taken at iteration entry.
///
/// The guard lives for the whole iteration and every exit path must give it
/// an explicit disposition: [`DeliveryLoop::restore_snapshot`] once the
/// agent attempt completes, [`DeliveryLoop::discard_snapshot`] on abort.
/// The handles are mirrored on disk in the iteration's `snapshot.json` so a
/// crashed or aborted iteration can pop its own stashes on resume.
#[must_use]
struct WorkspaceSnapshot {
    /// Repos whose dirty state was stashed under `message`.
    stashed: Vec<PathBuf>,
    message: String,
}

impl WorkspaceSnapshot {
    fn is_empty(&self) -> bool {
        self.stashed.is_empty()
    }
}

/// How the loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryVerdict {
    /// Every blocking condition passed.
    Completed,
    /// The loop terminated without success.
    Terminated {
        reason: TerminalReason,
        detail: String,
    },
}

pub struct DeliveryLoop {
    agent: Arc<dyn AgentProvider>,
    check_runner: Arc<dyn CheckRunner>,
    diff_service: Arc<dyn DiffService>,
    task_repo: Arc<dyn TaskRepository>,
    gateway: Arc<dyn UserGateway>,
    artifacts: ArtifactStore,
    evidence: EvidenceStore,
    config: DeliveryConfig,
}

impl DeliveryLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: Arc<dyn AgentProvider>,
        check_runner: Arc<dyn CheckRunner>,
        diff_service: Arc<dyn DiffService>,
        task_repo: Arc<dyn TaskRepository>,
        gateway: Arc<dyn UserGateway>,
        artifacts: ArtifactStore,
        evidence: EvidenceStore,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            agent,
            check_runner,
            diff_service,
            task_repo,
            gateway,
            artifacts,
            evidence,
            config,
        }
    }

    pub async fn run(&self, ctx: &mut RunContext) -> CoreResult<DeliveryVerdict> {
        loop {
            let number = ctx.task.next_iteration_number();

            if number > ctx.task.budget.max_iterations {
                return Ok(DeliveryVerdict::Terminated {
                    reason: TerminalReason::Budget,
                    detail: format!(
                        "iteration cap of {} reached",
                        ctx.task.budget.max_iterations
                    ),
                });
            }
            if Instant::now() >= ctx.deadline {
                return Ok(DeliveryVerdict::Terminated {
                    reason: TerminalReason::Budget,
                    detail: format!(
                        "wall-clock budget of {} minutes exhausted",
                        ctx.task.budget.max_wall_clock_minutes
                    ),
                });
            }
            if ctx.is_cancelled() {
                return Ok(DeliveryVerdict::Terminated {
                    reason: TerminalReason::Cancelled,
                    detail: "cancellation requested".to_string(),
                });
            }

            self.recover_incomplete_iteration(ctx, number).await?;

            match self.run_iteration(ctx, number).await? {
                Some(verdict) => return Ok(verdict),
                None => continue,
            }
        }
    }

    /// A crash or abort mid-iteration leaves a directory without a recorded
    /// diff. Archive its event stream, then pop the stashes its snapshot
    /// manifest names so the pre-iteration work is back in the tree before
    /// the iteration re-runs.
    async fn recover_incomplete_iteration(
        &self,
        ctx: &RunContext,
        number: u32,
    ) -> CoreResult<()> {
        let task_id = ctx.task.id;
        if !self.artifacts.iteration_dir_exists(task_id, number).await
            || self.artifacts.iteration_has_diff(task_id, number).await
        {
            return Ok(());
        }

        warn!(task_id = %task_id, number, "recovering interrupted iteration");
        self.artifacts.archive_orphan_events(task_id, number).await?;

        if let Some(manifest) = self.artifacts.load_snapshot_manifest(task_id, number).await? {
            debug!(
                task_id = %task_id,
                number,
                repos = manifest.repos.len(),
                "restoring stashes from the interrupted iteration's snapshot"
            );
            for result in self.diff_service.pop_all_repos(&manifest.repos).await {
                if !result.success {
                    warn!(
                        repo = %result.repo_path.display(),
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "could not pop snapshot stash; entry kept for manual recovery"
                    );
                }
            }
            self.artifacts.remove_snapshot_manifest(task_id, number).await?;
        }
        Ok(())
    }

    /// One full iteration. Returns Some(verdict) to stop the loop, None to
    /// keep iterating.
    async fn run_iteration(
        &self,
        ctx: &mut RunContext,
        number: u32,
    ) -> CoreResult<Option<DeliveryVerdict>> {
        let task_id = ctx.task.id;
        info!(task_id = %task_id, number, "starting iteration");
        let mut iteration = Iteration::started(number);

        let snapshot = self.take_snapshot(ctx, number).await?;
        let prompt = self.build_prompt(ctx, number).await?;

        let result = match self.drive_agent(ctx, &prompt).await {
            Ok(result) => {
                self.restore_snapshot(task_id, number, snapshot).await?;
                result
            }
            Err(err) => {
                // Abort: the pre-iteration stashes stay put, labeled, with
                // the manifest pointing at them; resume pops them before
                // re-running this iteration.
                self.discard_snapshot(task_id, number, &snapshot);
                let (reason, detail) = match &err {
                    CoreError::Cancelled => (
                        TerminalReason::Cancelled,
                        "cancelled during agent execution".to_string(),
                    ),
                    CoreError::Auth(_) => (TerminalReason::Auth, err.to_string()),
                    CoreError::RateLimit(_) | CoreError::Transient(_) | CoreError::Provider(_) => {
                        (TerminalReason::ProviderError, err.to_string())
                    }
                    _ => return Err(err),
                };
                warn!(task_id = %task_id, number, error = %err, "iteration aborted");
                return Ok(Some(DeliveryVerdict::Terminated { reason, detail }));
            }
        };

        // Only the completed attempt's stream is durable; a retried
        // attempt's partial output never reaches the event log.
        self.artifacts
            .save_agent_events(task_id, number, &result.messages)
            .await?;
        for msg in &result.messages {
            ctx.tracker.on_message(msg);
        }
        self.artifacts
            .save_transcript(task_id, number, &build_transcript(&result, number))
            .await?;

        let diff = self
            .diff_service
            .worktree_diff_all(&ctx.workspace.repos)
            .await?;
        self.artifacts
            .save_diff(
                task_id,
                number,
                &diff.combined_diff(),
                &diff.combined_patch(),
            )
            .await?;
        iteration.events_path = Some("agent/events.jsonl".to_string());
        iteration.diff_path = Some("diffs/worktree.diff".to_string());

        let failing_now = self.run_checks(ctx, number, &mut iteration).await?;

        let diff_empty = diff.is_empty();
        let blocking_total = ctx.task.blocking_conditions().count();
        let (prev, prev2) = previous_failing_sets(ctx);
        let outcome = decide_outcome(&DecisionInputs {
            blocking_total,
            diff_empty,
            failing_now: &failing_now,
            prev: prev.as_deref(),
            prev2: prev2.as_deref(),
            config: &self.config,
        });

        iteration.failing_blocking = failing_now;
        iteration.finish(outcome);
        self.artifacts.save_iteration(task_id, &iteration).await?;
        ctx.task.record_iteration(iteration);
        self.task_repo.save(&ctx.task).await?;

        if outcome == IterationOutcome::Stagnated {
            ctx.stagnation_count += 1;
        } else {
            ctx.stagnation_count = 0;
        }
        self.artifacts
            .append_timeline(
                task_id,
                &TimelineEvent::Iteration {
                    number,
                    outcome,
                    stagnation_count: ctx.stagnation_count,
                    failing_blocking: ctx.task.iterations[number as usize - 1]
                        .failing_blocking
                        .len() as u64,
                },
            )
            .await?;
        info!(
            task_id = %task_id,
            number,
            outcome = outcome.as_str(),
            stagnation_count = ctx.stagnation_count,
            "iteration finished"
        );

        match outcome {
            IterationOutcome::Completed => Ok(Some(DeliveryVerdict::Completed)),
            IterationOutcome::Stagnated
                if ctx.stagnation_count >= self.config.stagnation_threshold =>
            {
                Ok(Some(DeliveryVerdict::Terminated {
                    reason: TerminalReason::Stagnated,
                    detail: format!(
                        "{} consecutive iterations without progress",
                        ctx.stagnation_count
                    ),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Stash every dirty repo under `proofloop: pre-iteration N` and keep
    /// the handles for the iteration's lifetime, mirrored into the
    /// iteration's `snapshot.json`.
    async fn take_snapshot(
        &self,
        ctx: &RunContext,
        number: u32,
    ) -> CoreResult<WorkspaceSnapshot> {
        let mut dirty: Vec<PathBuf> = Vec::new();
        for repo in &ctx.workspace.repos {
            match self.diff_service.worktree_diff(repo).await {
                Ok(diff) if !diff.is_empty() => dirty.push(repo.clone()),
                Ok(_) => {}
                Err(e) => debug!(repo = %repo.display(), error = %e, "skipping snapshot probe"),
            }
        }

        let message = format!("proofloop: pre-iteration {number}");
        let mut stashed = Vec::new();
        for result in self.diff_service.stash_all_repos(&dirty, &message).await {
            if result.success {
                stashed.push(result.repo_path);
            } else {
                warn!(
                    repo = %result.repo_path.display(),
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "failed to stash repo for snapshot"
                );
            }
        }

        let snapshot = WorkspaceSnapshot { stashed, message };
        if !snapshot.is_empty() {
            self.artifacts
                .save_snapshot_manifest(
                    ctx.task.id,
                    number,
                    &SnapshotManifest {
                        repos: snapshot.stashed.clone(),
                        message: snapshot.message.clone(),
                    },
                )
                .await?;
        }
        Ok(snapshot)
    }

    /// Success disposition: pop the stashed pre-iteration work back on top
    /// of the agent's changes and retire the manifest.
    async fn restore_snapshot(
        &self,
        task_id: Uuid,
        number: u32,
        snapshot: WorkspaceSnapshot,
    ) -> CoreResult<()> {
        if snapshot.is_empty() {
            return Ok(());
        }
        for result in self.diff_service.pop_all_repos(&snapshot.stashed).await {
            if !result.success {
                warn!(
                    repo = %result.repo_path.display(),
                    error = result.error.as_deref().unwrap_or("unknown"),
                    stash = %snapshot.message,
                    "failed to pop snapshot stash; entry kept for manual recovery"
                );
            }
        }
        self.artifacts.remove_snapshot_manifest(task_id, number).await
    }

    /// Abort disposition: the stash entries and manifest stay in place.
    /// Resume finds the manifest and pops the stashes before re-running the
    /// iteration, so prior iterations' work is never thrown away.
    fn discard_snapshot(&self, task_id: Uuid, number: u32, snapshot: &WorkspaceSnapshot) {
        if snapshot.is_empty() {
            return;
        }
        info!(
            task_id = %task_id,
            number,
            repos = snapshot.stashed.len(),
            stash = %snapshot.message,
            "pre-iteration work left stashed for recovery"
        );
    }

    async fn build_prompt(&self, ctx: &RunContext, number: u32) -> CoreResult<String> {
        let mut failing: Vec<(String, String)> = Vec::new();
        if let Some(prev) = ctx.task.iterations.last() {
            for cid in &prev.failing_blocking {
                let description = ctx
                    .task
                    .conditions
                    .iter()
                    .find(|c| c.id == *cid)
                    .map_or_else(|| cid.to_string(), |c| c.description.clone());
                let output = self
                    .evidence
                    .read_last_log(ctx.task.id, prev.number, *cid, 2_000)
                    .await?
                    .unwrap_or_else(|| "(no recorded output)".to_string());
                failing.push((description, output));
            }
        }

        let summary = ctx.tracker.format_for_prompt(20);
        Ok(delivery_prompt(&DeliveryPromptContext {
            task: &ctx.task,
            inventory: &ctx.inventory,
            failing: &failing,
            command_summary: &summary,
            iteration: number,
        }))
    }

    /// Execute the agent. The live callback streams every message as it
    /// arrives, including those of attempts the retry policy later
    /// discards; the durable event log is written by the caller from the
    /// completed attempt's result only.
    async fn drive_agent(&self, ctx: &mut RunContext, prompt: &str) -> CoreResult<AgentResult> {
        let gateway = Arc::clone(&self.gateway);
        let callback: MessageCallback = Arc::new(move |msg| gateway.on_agent_message(msg));

        tokio::select! {
            result = self.agent.execute(
                prompt,
                &DELIVERY_TOOLS,
                &ctx.workspace.root,
                Some(callback),
                &ctx.selected_mcp,
            ) => result,
            () = wait_cancelled(&mut ctx.cancel) => Err(CoreError::Cancelled),
        }
    }

    /// Run every condition's check, persist evidence, and return the sorted
    /// failing blocking set.
    async fn run_checks(
        &self,
        ctx: &mut RunContext,
        number: u32,
        iteration: &mut Iteration,
    ) -> CoreResult<Vec<Uuid>> {
        let task_id = ctx.task.id;
        let workspace_root = ctx.workspace.root.clone();
        let mut failing = Vec::new();

        for condition in &mut ctx.task.conditions {
            let result = match &condition.check_command {
                Some(command) => {
                    let spec = CheckSpec::new(condition.id, command.clone());
                    let output = self.check_runner.run(&spec, &workspace_root).await?;
                    let refs = self
                        .evidence
                        .save_check_evidence(task_id, number, &output)
                        .await?;
                    CheckResult::from_output(&output)
                        .with_evidence(refs.artifact_path, refs.log_path)
                }
                // No runnable command: recorded as skipped, which never
                // counts as passing.
                None => CheckResult::status_only(condition.id, CheckStatus::Skipped),
            };

            if condition.gates_completion() && !result.passed() {
                failing.push(condition.id);
            }
            condition.last_result = Some(result.clone());
            iteration.check_results.push(result);
        }

        failing.sort();
        Ok(failing)
    }
}

struct DecisionInputs<'a> {
    blocking_total: usize,
    diff_empty: bool,
    failing_now: &'a [Uuid],
    prev: Option<&'a [Uuid]>,
    prev2: Option<&'a [Uuid]>,
    config: &'a DeliveryConfig,
}

/// The per-iteration outcome decision. Signal conditions never appear in
/// the failing sets and therefore never influence this.
fn decide_outcome(inputs: &DecisionInputs<'_>) -> IterationOutcome {
    if inputs.blocking_total == 0 {
        // No gates: one iteration completes the task, unless configured to
        // insist on a non-empty diff.
        return if inputs.config.require_diff_when_unconditioned && inputs.diff_empty {
            IterationOutcome::Stagnated
        } else {
            IterationOutcome::Completed
        };
    }

    if inputs.failing_now.is_empty() {
        return IterationOutcome::Completed;
    }

    let some_previous_failure_fixed = inputs
        .prev
        .is_some_and(|prev| prev.iter().any(|id| !inputs.failing_now.contains(id)));
    if !inputs.diff_empty && some_previous_failure_fixed {
        return IterationOutcome::Progressed;
    }

    let repeated_twice = inputs.prev == Some(inputs.failing_now)
        && inputs.prev2 == Some(inputs.failing_now);
    if inputs.diff_empty || repeated_twice {
        return IterationOutcome::Stagnated;
    }

    IterationOutcome::Progressed
}

fn previous_failing_sets(ctx: &RunContext) -> (Option<Vec<Uuid>>, Option<Vec<Uuid>>) {
    let n = ctx.task.iterations.len();
    let prev = n.checked_sub(1).map(|i| ctx.task.iterations[i].failing_blocking.clone());
    let prev2 = n.checked_sub(2).map(|i| ctx.task.iterations[i].failing_blocking.clone());
    (prev, prev2)
}

fn build_transcript(result: &AgentResult, number: u32) -> String {
    let mut out = format!("# Iteration {number}\n\n");
    for msg in &result.messages {
        match msg.role {
            MessageRole::Assistant => {
                out.push_str(&format!("**Assistant**\n\n{}\n\n", msg.content));
            }
            MessageRole::Thought => {
                out.push_str(&format!("*Thinking: {}*\n\n", msg.content));
            }
            MessageRole::ToolUse => {
                let name = msg.tool_name.as_ref().map_or("tool", ToolName::as_str);
                let input = msg
                    .tool_input
                    .as_ref()
                    .and_then(|i| serde_json::to_string(i).ok())
                    .unwrap_or_default();
                out.push_str(&format!("`{name}` {input}\n\n"));
            }
            MessageRole::ToolResult => {
                if !msg.content.is_empty() {
                    out.push_str(&format!("```\n{}\n```\n\n", msg.content));
                }
            }
            MessageRole::Status => {
                out.push_str(&format!("_{}_\n\n", msg.content));
            }
        }
    }
    out
}
