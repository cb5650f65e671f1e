//! Shared mutable state threaded through the pipeline.

use std::collections::BTreeMap;
use std::time::Instant;

use tokio::sync::watch;

use crate::domain::models::{
    ClarificationQuestion, McpServerConfig, ProjectAnalysis, Task, WorkspaceInfo,
};
use crate::services::command_tracker::CommandTracker;

/// Everything one task run accumulates while moving through the stages.
pub struct RunContext {
    pub task: Task,
    pub workspace: WorkspaceInfo,
    pub inventory: ProjectAnalysis,
    /// Strategy-stage rationale, also cached on disk.
    pub strategy: Option<String>,
    pub selected_mcp: BTreeMap<String, McpServerConfig>,
    /// Questions asked during clarification, kept for plan-prompt notes.
    pub clarification_questions: Vec<ClarificationQuestion>,
    /// Accumulated plan feedback from approval loops.
    pub planning_feedback: Vec<String>,
    pub tracker: CommandTracker,
    /// Monotonic wall-clock budget deadline.
    pub deadline: Instant,
    /// Run baseline checks before delivery.
    pub baseline: bool,
    pub mcp_enabled: bool,
    /// Server names preselected on the command line.
    pub preselected_mcp: Vec<String>,
    /// Consecutive stagnated iterations, for the terminal timeline event.
    pub stagnation_count: u32,
    /// Human-readable elaboration of the terminal reason.
    pub terminal_detail: Option<String>,
    pub cancel: watch::Receiver<bool>,
}

impl RunContext {
    pub fn new(task: Task, workspace: WorkspaceInfo, cancel: watch::Receiver<bool>) -> Self {
        let deadline = Instant::now() + task.budget.max_wall_clock();
        Self {
            task,
            workspace,
            inventory: ProjectAnalysis::default(),
            strategy: None,
            selected_mcp: BTreeMap::new(),
            clarification_questions: Vec::new(),
            planning_feedback: Vec::new(),
            tracker: CommandTracker::new(),
            deadline,
            baseline: false,
            mcp_enabled: false,
            preselected_mcp: Vec::new(),
            stagnation_count: 0,
            terminal_detail: None,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Resolve only when cancellation fires; pends forever when the sender is
/// gone (no cancellation source).
pub async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    loop {
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
        if *rx.borrow() {
            return;
        }
    }
}
