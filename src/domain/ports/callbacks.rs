//! User-interaction callbacks exposed to the host.
//!
//! Callbacks run in the driver's context and must not re-enter the
//! orchestrator.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::models::{
    AgentMessage, ClarificationAnswer, ClarificationQuestion, Condition, McpSuggestion, Plan,
    Stage,
};

/// Decision returned from the plan-and-conditions gate.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    Approved,
    Rejected,
    /// Loop back to planning with this feedback appended to the prompt.
    Feedback(String),
    /// Re-enter the gate with an edited condition list.
    Edit(Vec<Condition>),
}

/// Host-provided user interaction surface.
#[async_trait]
pub trait UserGateway: Send + Sync {
    async fn on_plan_and_conditions(
        &self,
        plan: &Plan,
        conditions: &[Condition],
    ) -> PlanDecision;

    /// One answer per question, in order.
    async fn on_clarification(
        &self,
        questions: &[ClarificationQuestion],
    ) -> Vec<ClarificationAnswer>;

    /// Server names the user confirmed.
    async fn on_mcp_selection(&self, suggestions: &[McpSuggestion]) -> Vec<String>;

    fn on_agent_message(&self, msg: &AgentMessage);

    fn on_stage(&self, stage: Stage, is_starting: bool, duration: Duration);
}

/// Gateway that approves everything, used by `--auto-approve` and tests.
#[derive(Debug, Default)]
pub struct AutoApproveGateway;

#[async_trait]
impl UserGateway for AutoApproveGateway {
    async fn on_plan_and_conditions(
        &self,
        _plan: &Plan,
        _conditions: &[Condition],
    ) -> PlanDecision {
        PlanDecision::Approved
    }

    async fn on_clarification(
        &self,
        questions: &[ClarificationQuestion],
    ) -> Vec<ClarificationAnswer> {
        questions
            .iter()
            .map(|q| ClarificationAnswer::auto(q.id))
            .collect()
    }

    async fn on_mcp_selection(&self, suggestions: &[McpSuggestion]) -> Vec<String> {
        suggestions.iter().map(|s| s.server.clone()).collect()
    }

    fn on_agent_message(&self, _msg: &AgentMessage) {}

    fn on_stage(&self, _stage: Stage, _is_starting: bool, _duration: Duration) {}
}
