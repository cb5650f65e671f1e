//! Iteration records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::check::CheckResult;

/// How one delivery iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    /// Non-empty diff, or the failing set shrank.
    Progressed,
    /// Empty diff, or the failing set repeated across iterations.
    Stagnated,
    /// The iteration aborted on a fatal error.
    Failed,
    /// Every blocking condition passed.
    Completed,
}

impl IterationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progressed => "progressed",
            Self::Stagnated => "stagnated",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }
}

/// One cycle of {drive agent, capture diff, run checks, decide outcome}.
///
/// Numbers are contiguous from 1 per task. Exactly one iteration is
/// in-flight at any moment; a crash mid-iteration leaves no record here and
/// is recovered from the iteration directory instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// `agent/events.jsonl` relative to the iteration directory.
    #[serde(default)]
    pub events_path: Option<String>,
    /// `diffs/worktree.diff` relative to the iteration directory.
    #[serde(default)]
    pub diff_path: Option<String>,
    #[serde(default)]
    pub check_results: Vec<CheckResult>,
    /// Sorted ids of blocking conditions that failed this iteration.
    #[serde(default)]
    pub failing_blocking: Vec<Uuid>,
    pub outcome: IterationOutcome,
}

impl Iteration {
    pub fn started(number: u32) -> Self {
        Self {
            number,
            started_at: Utc::now(),
            ended_at: None,
            events_path: None,
            diff_path: None,
            check_results: Vec::new(),
            failing_blocking: Vec::new(),
            outcome: IterationOutcome::Progressed,
        }
    }

    pub fn finish(&mut self, outcome: IterationOutcome) {
        self.outcome = outcome;
        self.ended_at = Some(Utc::now());
    }
}
