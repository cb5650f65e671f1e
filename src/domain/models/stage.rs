//! Pipeline stages and outcomes.

use serde::{Deserialize, Serialize};

use super::task::TerminalReason;

/// Stages of the code pipeline, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Strategy,
    VerificationInventory,
    McpSelection,
    Clarification,
    Planning,
    Conditions,
    ApprovalPlanConditions,
    Delivery,
    Quality,
    Finalize,
}

impl Stage {
    /// Canonical execution order.
    pub const ORDER: [Stage; 11] = [
        Self::Intake,
        Self::Strategy,
        Self::VerificationInventory,
        Self::McpSelection,
        Self::Clarification,
        Self::Planning,
        Self::Conditions,
        Self::ApprovalPlanConditions,
        Self::Delivery,
        Self::Quality,
        Self::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Strategy => "strategy",
            Self::VerificationInventory => "verification_inventory",
            Self::McpSelection => "mcp_selection",
            Self::Clarification => "clarification",
            Self::Planning => "planning",
            Self::Conditions => "conditions",
            Self::ApprovalPlanConditions => "approval_plan_conditions",
            Self::Delivery => "delivery",
            Self::Quality => "quality",
            Self::Finalize => "finalize",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|stage| stage.as_str() == s)
    }

    /// The next stage in canonical order, None after Finalize.
    pub fn next(&self) -> Option<Stage> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    /// Human-readable name for CLI display.
    pub fn display_hint(&self) -> &'static str {
        match self {
            Self::Intake => "Understanding the task",
            Self::Strategy => "Choosing an approach",
            Self::VerificationInventory => "Discovering verification commands",
            Self::McpSelection => "Selecting external tools",
            Self::Clarification => "Clarifying requirements",
            Self::Planning => "Planning the work",
            Self::Conditions => "Proposing completion conditions",
            Self::ApprovalPlanConditions => "Waiting for plan approval",
            Self::Delivery => "Implementing",
            Self::Quality => "Final verification",
            Self::Finalize => "Writing final record",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a completed stage tells the pipeline to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Advance to the next stage in canonical order.
    Continue,
    /// Re-enter a (possibly earlier) stage with extra context.
    Loop { stage: Stage, context: String },
    /// User input is required before the pipeline can advance.
    Gate,
    /// Terminate the pipeline with the given reason.
    Stop { reason: TerminalReason },
}

impl StageOutcome {
    /// Short machine form recorded in timeline events.
    pub fn label(&self) -> String {
        match self {
            Self::Continue => "continue".to_string(),
            Self::Loop { stage, .. } => format!("loop:{stage}"),
            Self::Gate => "gate".to_string(),
            Self::Stop { reason } => format!("stop:{}", reason.as_str()),
        }
    }
}
