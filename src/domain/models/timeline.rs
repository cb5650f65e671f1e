//! Timeline events.
//!
//! The timeline is the append-only record of everything the pipeline did.
//! Resume replays it to find where to re-enter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::iteration::IterationOutcome;
use super::stage::Stage;
use super::task::{TaskStatus, TerminalReason};

/// One line of `timeline.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    Stage {
        stage: Stage,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        /// Outcome label: `continue`, `loop:<stage>`, `gate`, `stop:<reason>`.
        outcome: String,
        duration_ms: u64,
    },
    Iteration {
        number: u32,
        outcome: IterationOutcome,
        stagnation_count: u32,
        #[serde(default)]
        failing_blocking: u64,
    },
    Terminal {
        status: TaskStatus,
        reason: TerminalReason,
        at: DateTime<Utc>,
        #[serde(default)]
        stagnation_count: u32,
    },
}

impl TimelineEvent {
    /// The stage this event belongs to, when it is a stage event.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_gate(&self) -> bool {
        matches!(self, Self::Stage { outcome, .. } if outcome == "gate")
    }
}
