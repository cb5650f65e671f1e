//! Task aggregate.
//!
//! A task owns its iterations and conditions and is mutated only by the
//! orchestrator while the per-task lock is held.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::condition::Condition;
use super::iteration::Iteration;
use super::plan::Plan;
use crate::domain::models::clarification::ClarificationAnswer;

/// Status of a task in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task record created, pipeline not yet entered
    Pending,
    /// Pipeline is running
    Executing,
    /// Every blocking condition passed and the final record was written
    Done,
    /// Terminated without success (auth failure, stagnation, parse failure)
    Blocked,
    /// Terminated by the user or a budget (reject, cancel, budget)
    Stopped,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Stopped => "stopped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "executing" => Some(Self::Executing),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Blocked | Self::Stopped)
    }

    /// Valid transitions from this status. Terminal statuses reopen only to
    /// Executing, and only through resume.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Executing, Self::Stopped],
            Self::Executing => &[Self::Done, Self::Blocked, Self::Stopped],
            Self::Done => &[],
            Self::Blocked | Self::Stopped => &[Self::Executing],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Why a task reached a terminal status.
///
/// The machine-readable form is recorded in `final_result.json` and in the
/// terminal timeline event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalReason {
    Completed,
    Auth,
    ParseFailure,
    Stagnated,
    QualityFailed,
    ProviderError,
    Budget,
    Cancelled,
    Rejected,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Auth => "auth",
            Self::ParseFailure => "parse-failure",
            Self::Stagnated => "stagnated",
            Self::QualityFailed => "quality-failed",
            Self::ProviderError => "provider-error",
            Self::Budget => "budget",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    /// Status implied by this reason.
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed => TaskStatus::Done,
            Self::Auth
            | Self::ParseFailure
            | Self::Stagnated
            | Self::QualityFailed
            | Self::ProviderError => TaskStatus::Blocked,
            Self::Budget | Self::Cancelled | Self::Rejected => TaskStatus::Stopped,
        }
    }
}

/// Iteration and wall-clock caps for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub max_iterations: u32,
    pub max_wall_clock_minutes: u64,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_wall_clock_minutes: 60,
        }
    }
}

impl Budget {
    pub fn max_wall_clock(&self) -> Duration {
        Duration::from_secs(self.max_wall_clock_minutes * 60)
    }
}

/// The task aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Workspace root plus any additional source roots.
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub iterations: Vec<Iteration>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub clarifications: Vec<ClarificationAnswer>,
    #[serde(default)]
    pub budget: Budget,
    #[serde(default)]
    pub terminal_reason: Option<TerminalReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(description: impl Into<String>, workspace: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            goals: Vec::new(),
            constraints: Vec::new(),
            sources: vec![workspace],
            status: TaskStatus::Pending,
            iterations: Vec::new(),
            conditions: Vec::new(),
            plan: None,
            clarifications: Vec::new(),
            budget: Budget::default(),
            terminal_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Workspace root (first source).
    pub fn workspace(&self) -> Option<&PathBuf> {
        self.sources.first()
    }

    /// Number of the next iteration to append (contiguous from 1).
    pub fn next_iteration_number(&self) -> u32 {
        self.iterations.len() as u32 + 1
    }

    /// Conditions with the blocking role, approval-filtered.
    pub fn blocking_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(|c| c.gates_completion())
    }

    /// Append a completed iteration, keeping numbering contiguous.
    ///
    /// Panics in debug builds if the number would leave a gap.
    pub fn record_iteration(&mut self, iteration: Iteration) {
        debug_assert_eq!(iteration.number, self.next_iteration_number());
        self.iterations.push(iteration);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Canonicalize timestamps for value comparison in round-trip tests.
    pub fn with_canonical_timestamps(mut self) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        self.created_at = epoch;
        self.updated_at = epoch;
        for it in &mut self.iterations {
            it.started_at = epoch;
            it.ended_at = Some(epoch);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_closed() {
        assert!(TaskStatus::Done.valid_transitions().is_empty());
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::Executing));
        assert!(!TaskStatus::Blocked.can_transition_to(TaskStatus::Done));
        assert!(TaskStatus::Stopped.can_transition_to(TaskStatus::Executing));
    }

    #[test]
    fn reason_implies_status() {
        assert_eq!(TerminalReason::Stagnated.status(), TaskStatus::Blocked);
        assert_eq!(TerminalReason::Budget.status(), TaskStatus::Stopped);
        assert_eq!(TerminalReason::Cancelled.status(), TaskStatus::Stopped);
        assert_eq!(TerminalReason::Completed.status(), TaskStatus::Done);
    }

    #[test]
    fn iteration_numbering_starts_at_one() {
        let task = Task::new("demo", PathBuf::from("/tmp/w"));
        assert_eq!(task.next_iteration_number(), 1);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Executing,
            TaskStatus::Done,
            TaskStatus::Blocked,
            TaskStatus::Stopped,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
    }
}
