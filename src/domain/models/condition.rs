//! Completion conditions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::check::CheckResult;

/// Whether a condition gates task completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionRole {
    /// Must pass before the task can transition to Done.
    Blocking,
    /// Recorded but never gates progress.
    Signal,
}

impl ConditionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Signal => "signal",
        }
    }
}

/// User approval state of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// A success criterion attached to a task.
///
/// Agent-proposed conditions start Pending; user-added conditions start
/// Approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: Uuid,
    pub description: String,
    pub role: ConditionRole,
    pub approval: ApprovalStatus,
    /// Shell command that verifies this condition, when one exists.
    #[serde(default)]
    pub check_command: Option<String>,
    #[serde(default)]
    pub last_result: Option<CheckResult>,
}

impl Condition {
    pub fn proposed(description: impl Into<String>, role: ConditionRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            role,
            approval: ApprovalStatus::Pending,
            check_command: None,
            last_result: None,
        }
    }

    pub fn user_added(description: impl Into<String>, role: ConditionRole) -> Self {
        Self {
            approval: ApprovalStatus::Approved,
            ..Self::proposed(description, role)
        }
    }

    pub fn with_check_command(mut self, command: impl Into<String>) -> Self {
        self.check_command = Some(command.into());
        self
    }

    /// A condition gates completion when it is blocking and not rejected.
    pub fn gates_completion(&self) -> bool {
        self.role == ConditionRole::Blocking && self.approval != ApprovalStatus::Rejected
    }

    /// Latest recorded check passed.
    pub fn is_passing(&self) -> bool {
        self.last_result
            .as_ref()
            .is_some_and(super::check::CheckResult::passed)
    }
}
