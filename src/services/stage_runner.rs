//! Stage implementations and their transition outcomes.
//!
//! Each stage is idempotent: replaying it with the same inputs produces the
//! same persisted record, timestamps aside. User gates write a `gate`
//! timeline event before invoking the callback so a crash while waiting
//! resumes at the same gate.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    ApprovalStatus, CheckResult, CheckSpec, Config, Stage, StageOutcome, TerminalReason,
    TimelineEvent, ToolName,
};
use crate::domain::ports::{
    AgentProvider, CheckRunner, DiffService, MessageCallback, PlanDecision, ProjectAnalyzerPort,
    TaskRepository, UserGateway,
};
use crate::infrastructure::mcp::McpRegistry;
use crate::infrastructure::persistence::{ArtifactStore, EvidenceStore};
use crate::services::context::RunContext;
use crate::services::delivery::{DeliveryLoop, DeliveryVerdict};
use crate::services::prompts;

/// Read-only tools used by reasoning-only stage queries.
const QUERY_TOOLS: [ToolName; 3] = [ToolName::Read, ToolName::Glob, ToolName::Grep];

pub struct StageRunner {
    agent: Arc<dyn AgentProvider>,
    analyzer: Arc<dyn ProjectAnalyzerPort>,
    check_runner: Arc<dyn CheckRunner>,
    task_repo: Arc<dyn TaskRepository>,
    gateway: Arc<dyn UserGateway>,
    artifacts: ArtifactStore,
    evidence: EvidenceStore,
    delivery: DeliveryLoop,
    mcp_registry: Option<McpRegistry>,
}

impl StageRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: Arc<dyn AgentProvider>,
        analyzer: Arc<dyn ProjectAnalyzerPort>,
        check_runner: Arc<dyn CheckRunner>,
        diff_service: Arc<dyn DiffService>,
        task_repo: Arc<dyn TaskRepository>,
        gateway: Arc<dyn UserGateway>,
        artifacts: ArtifactStore,
        evidence: EvidenceStore,
        mcp_registry: Option<McpRegistry>,
        config: Config,
    ) -> Self {
        let delivery = DeliveryLoop::new(
            Arc::clone(&agent),
            Arc::clone(&check_runner),
            diff_service,
            Arc::clone(&task_repo),
            Arc::clone(&gateway),
            artifacts.clone(),
            evidence.clone(),
            config.delivery,
        );
        Self {
            agent,
            analyzer,
            check_runner,
            task_repo,
            gateway,
            artifacts,
            evidence,
            delivery,
            mcp_registry,
        }
    }

    pub async fn run_stage(&self, stage: Stage, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        debug!(task_id = %ctx.task.id, stage = %stage, "entering stage");
        match stage {
            Stage::Intake => self.intake(ctx).await,
            Stage::Strategy => self.strategy(ctx).await,
            Stage::VerificationInventory => self.verification_inventory(ctx).await,
            Stage::McpSelection => self.mcp_selection(ctx).await,
            Stage::Clarification => self.clarification(ctx).await,
            Stage::Planning => self.planning(ctx).await,
            Stage::Conditions => self.conditions(ctx).await,
            Stage::ApprovalPlanConditions => self.approval(ctx).await,
            Stage::Delivery => self.delivery(ctx).await,
            Stage::Quality => self.quality(ctx).await,
            Stage::Finalize => Ok(StageOutcome::Stop {
                reason: TerminalReason::Completed,
            }),
        }
    }

    // -----------------------------------------------------------------------

    async fn intake(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        if ctx.task.goals.is_empty() {
            let prompt = prompts::intake_prompt(&ctx.task.description);
            let (goals, constraints) = self
                .query_and_parse(ctx, &prompt, prompts::parse_intake)
                .await?;
            ctx.task.goals = goals;
            ctx.task.constraints.extend(constraints);
            ctx.task.touch();
        }
        self.task_repo.save(&ctx.task).await?;
        Ok(StageOutcome::Continue)
    }

    async fn strategy(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        let prompt = prompts::strategy_prompt(&ctx.task, &ctx.inventory);
        let result = self
            .agent
            .execute(
                &prompt,
                &QUERY_TOOLS,
                &ctx.workspace.root,
                Some(self.live_callback()),
                &ctx.selected_mcp,
            )
            .await?;
        let rationale = result.final_response.trim().to_string();
        self.artifacts
            .save_cache(ctx.task.id, "strategy", &json!({ "rationale": rationale }))
            .await?;
        ctx.strategy = (!rationale.is_empty()).then_some(rationale);
        Ok(StageOutcome::Continue)
    }

    async fn verification_inventory(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        ctx.inventory = self
            .analyzer
            .analyze(&ctx.workspace.root, Some(self.live_callback()))
            .await;
        let as_value = serde_json::to_value(&ctx.inventory)
            .map_err(|e| CoreError::ParseFailure(e.to_string()))?;
        self.artifacts
            .save_cache(ctx.task.id, "inventory", &as_value)
            .await?;
        info!(
            task_id = %ctx.task.id,
            commands = %ctx.inventory.summary(),
            "verification inventory complete"
        );

        if ctx.baseline {
            self.run_baseline(ctx).await?;
        }
        Ok(StageOutcome::Continue)
    }

    /// Record how the discovered commands behave before the agent changes
    /// anything.
    async fn run_baseline(&self, ctx: &RunContext) -> CoreResult<()> {
        for (kind, command) in &ctx.inventory.commands {
            let check_id = Uuid::new_v4();
            let spec = CheckSpec::new(check_id, command.clone());
            let output = self.check_runner.run(&spec, &ctx.workspace.root).await?;
            self.evidence
                .save_baseline_evidence(ctx.task.id, check_id, &output)
                .await?;
            debug!(kind = kind.as_str(), status = output.status.as_str(), "baseline check recorded");
        }
        Ok(())
    }

    async fn mcp_selection(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        let Some(registry) = (ctx.mcp_enabled).then_some(self.mcp_registry.as_ref()).flatten()
        else {
            return Ok(StageOutcome::Continue);
        };

        if !ctx.preselected_mcp.is_empty() {
            ctx.selected_mcp = registry.resolve(&ctx.preselected_mcp);
            return Ok(StageOutcome::Continue);
        }

        let available: Vec<_> = registry.all().collect();
        let prompt = prompts::mcp_suggestion_prompt(&ctx.task, &available);
        let suggestions = self
            .query_and_parse(ctx, &prompt, prompts::parse_mcp_suggestions)
            .await?;
        if suggestions.is_empty() {
            return Ok(StageOutcome::Continue);
        }

        self.record_gate(ctx, Stage::McpSelection).await?;
        let selected = self.gateway.on_mcp_selection(&suggestions).await;
        ctx.selected_mcp = registry.resolve(&selected);
        info!(task_id = %ctx.task.id, servers = ctx.selected_mcp.len(), "MCP servers selected");
        Ok(StageOutcome::Continue)
    }

    async fn clarification(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        let prompt = prompts::clarification_prompt(&ctx.task);
        let questions = self
            .query_and_parse(ctx, &prompt, prompts::parse_clarifications)
            .await?;
        if questions.is_empty() {
            return Ok(StageOutcome::Continue);
        }

        self.record_gate(ctx, Stage::Clarification).await?;
        let answers = self.gateway.on_clarification(&questions).await;

        // Concrete answers become constraints; auto answers defer to plan
        // time through the clarification notes.
        for answer in &answers {
            if answer.is_auto() {
                continue;
            }
            let question_text = questions
                .iter()
                .find(|q| q.id == answer.question_id)
                .map_or("clarification", |q| q.question.as_str());
            let answer_text = answer
                .custom_value
                .clone()
                .unwrap_or_else(|| answer.selected_option.clone());
            ctx.task
                .constraints
                .push(format!("{question_text}: {answer_text}"));
        }
        ctx.task.clarifications.extend(answers);
        ctx.clarification_questions = questions;
        ctx.task.touch();
        self.task_repo.save(&ctx.task).await?;
        Ok(StageOutcome::Continue)
    }

    async fn planning(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        let notes = prompts::clarification_notes(&ctx.task, &ctx.clarification_questions);
        let prompt = prompts::planning_prompt(
            &ctx.task,
            &ctx.inventory,
            ctx.strategy.as_deref(),
            &notes,
            &ctx.planning_feedback,
        );
        let plan = self.query_and_parse(ctx, &prompt, prompts::parse_plan).await?;
        info!(task_id = %ctx.task.id, steps = plan.steps.len(), "plan produced");
        ctx.task.plan = Some(plan);
        ctx.task.touch();
        self.task_repo.save(&ctx.task).await?;
        Ok(StageOutcome::Continue)
    }

    async fn conditions(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        let Some(plan) = ctx.task.plan.clone() else {
            return Err(CoreError::ParseFailure(
                "conditions stage reached without a plan".to_string(),
            ));
        };
        let prompt = prompts::conditions_prompt(&ctx.task, &plan, &ctx.inventory);
        let proposed = self
            .query_and_parse(ctx, &prompt, prompts::parse_conditions)
            .await?;

        // Replays (plan feedback loops) re-propose; keep user-approved
        // conditions, replace pending proposals.
        ctx.task
            .conditions
            .retain(|c| c.approval == ApprovalStatus::Approved);
        ctx.task.conditions.extend(proposed);
        ctx.task.touch();
        self.task_repo.save(&ctx.task).await?;
        Ok(StageOutcome::Continue)
    }

    async fn approval(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        let Some(plan) = ctx.task.plan.clone() else {
            return Err(CoreError::ParseFailure(
                "approval stage reached without a plan".to_string(),
            ));
        };

        self.record_gate(ctx, Stage::ApprovalPlanConditions).await?;
        let decision = self
            .gateway
            .on_plan_and_conditions(&plan, &ctx.task.conditions)
            .await;

        match decision {
            PlanDecision::Approved => {
                for condition in &mut ctx.task.conditions {
                    if condition.approval == ApprovalStatus::Pending {
                        condition.approval = ApprovalStatus::Approved;
                    }
                }
                ctx.task.touch();
                self.task_repo.save(&ctx.task).await?;
                Ok(StageOutcome::Continue)
            }
            PlanDecision::Rejected => Ok(StageOutcome::Stop {
                reason: TerminalReason::Rejected,
            }),
            PlanDecision::Feedback(text) => {
                ctx.planning_feedback.push(text.clone());
                Ok(StageOutcome::Loop {
                    stage: Stage::Planning,
                    context: text,
                })
            }
            PlanDecision::Edit(conditions) => {
                ctx.task.conditions = conditions;
                ctx.task.touch();
                self.task_repo.save(&ctx.task).await?;
                Ok(StageOutcome::Loop {
                    stage: Stage::ApprovalPlanConditions,
                    context: "edited conditions".to_string(),
                })
            }
        }
    }

    async fn delivery(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        match self.delivery.run(ctx).await? {
            DeliveryVerdict::Completed => Ok(StageOutcome::Continue),
            DeliveryVerdict::Terminated { reason, detail } => {
                ctx.terminal_detail = Some(detail);
                Ok(StageOutcome::Stop { reason })
            }
        }
    }

    /// Re-run every blocking condition one final time; any failure demotes
    /// the provisional success to Blocked.
    async fn quality(&self, ctx: &mut RunContext) -> CoreResult<StageOutcome> {
        let Some(last_iteration) = ctx.task.iterations.last().map(|i| i.number) else {
            return Ok(StageOutcome::Continue);
        };

        let workspace_root = ctx.workspace.root.clone();
        let task_id = ctx.task.id;
        let mut failed: Vec<String> = Vec::new();

        for condition in &mut ctx.task.conditions {
            if !condition.gates_completion() {
                continue;
            }
            let Some(command) = condition.check_command.clone() else {
                continue;
            };
            let spec = CheckSpec::new(condition.id, command);
            let output = self.check_runner.run(&spec, &workspace_root).await?;
            let refs = self
                .evidence
                .save_check_evidence(task_id, last_iteration, &output)
                .await?;
            let result = CheckResult::from_output(&output)
                .with_evidence(refs.artifact_path, refs.log_path);
            let passed = result.passed();
            condition.last_result = Some(result);
            if !passed {
                failed.push(condition.description.clone());
            }
        }

        if failed.is_empty() {
            Ok(StageOutcome::Continue)
        } else {
            warn!(task_id = %task_id, failed = failed.len(), "quality gate demoted the task");
            ctx.terminal_detail = Some(format!("final verification failed: {}", failed.join("; ")));
            Ok(StageOutcome::Stop {
                reason: TerminalReason::QualityFailed,
            })
        }
    }

    // -----------------------------------------------------------------------

    /// Agent query with typed parsing and the single-retry policy: a first
    /// parse failure retries once with a stricter reminder, a second one
    /// surfaces.
    async fn query_and_parse<T>(
        &self,
        ctx: &RunContext,
        prompt: &str,
        parse: impl Fn(&str) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let result = self
            .agent
            .execute(
                prompt,
                &QUERY_TOOLS,
                &ctx.workspace.root,
                Some(self.live_callback()),
                &ctx.selected_mcp,
            )
            .await?;

        match parse(&result.final_response) {
            Ok(value) => Ok(value),
            Err(CoreError::ParseFailure(first)) => {
                warn!(task_id = %ctx.task.id, error = %first, "stage output parse failed, retrying once");
                let retry_prompt = format!("{prompt}{}", prompts::PARSE_REMINDER);
                let result = self
                    .agent
                    .execute(
                        &retry_prompt,
                        &QUERY_TOOLS,
                        &ctx.workspace.root,
                        Some(self.live_callback()),
                        &ctx.selected_mcp,
                    )
                    .await?;
                parse(&result.final_response)
            }
            Err(other) => Err(other),
        }
    }

    fn live_callback(&self) -> MessageCallback {
        let gateway = Arc::clone(&self.gateway);
        Arc::new(move |msg| gateway.on_agent_message(msg))
    }

    /// Record that this stage needs user input. Resume re-enters the stage
    /// that wrote the most recent gate event.
    async fn record_gate(&self, ctx: &RunContext, stage: Stage) -> CoreResult<()> {
        let now = Utc::now();
        self.artifacts
            .append_timeline(
                ctx.task.id,
                &TimelineEvent::Stage {
                    stage,
                    started_at: now,
                    ended_at: now,
                    outcome: StageOutcome::Gate.label(),
                    duration_ms: 0,
                },
            )
            .await
    }

}
