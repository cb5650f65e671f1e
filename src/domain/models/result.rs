//! Final run results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{TaskStatus, TerminalReason};

/// What `run`/`resume` hand back to the caller, mirrored into
/// `final/final_result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunResult {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub reason: TerminalReason,
    /// Human-readable elaboration of the reason.
    pub detail: String,
    pub iterations: u32,
    pub conditions_passed: Vec<String>,
    pub conditions_failed: Vec<String>,
    pub files_changed: u64,
    pub insertions: u64,
    pub deletions: u64,
}

impl TaskRunResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Process exit code per the CLI contract: 0 Done, 2 Blocked/Stopped.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            2
        }
    }
}
