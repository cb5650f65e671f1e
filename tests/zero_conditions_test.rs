//! Boundary: tasks with no blocking conditions complete after one iteration.

mod helpers;

use std::sync::Arc;

use proofloop::domain::models::{TaskStatus, TerminalReason};
use proofloop::services::TaskInput;

use helpers::{build_orchestrator, init_repo, FakeAnalyzer, RecordingDiffService, ScriptedAgent};

#[tokio::test]
async fn unconditioned_task_completes_after_one_iteration() {
    let workspace = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    init_repo(workspace.path(), &[("notes.md", "draft\n")]);

    // No delivery action queued: the agent returns without a diff. The
    // proposed signal condition has no command, so nothing gates.
    let agent = Arc::new(ScriptedAgent::new());
    let (orchestrator, task_repo) = build_orchestrator(
        Arc::clone(&agent) as Arc<_>,
        Arc::new(FakeAnalyzer::empty()),
        Arc::new(RecordingDiffService::new()),
        state.path(),
    );

    let input = TaskInput::new("Tidy the notes", workspace.path());
    let result = orchestrator.run(input).await.unwrap();

    assert_eq!(result.status, TaskStatus::Done);
    assert_eq!(result.reason, TerminalReason::Completed);
    assert_eq!(result.iterations, 1);

    use proofloop::domain::ports::TaskRepository;
    let task = task_repo.load(result.task_id).await.unwrap().unwrap();
    assert_eq!(task.iterations.len(), 1);
    assert_eq!(
        task.iterations[0].outcome,
        proofloop::domain::models::IterationOutcome::Completed
    );
    // The signal condition was recorded as skipped, not failed.
    let signal = task
        .conditions
        .iter()
        .find(|c| c.role == proofloop::domain::models::ConditionRole::Signal)
        .expect("agent-proposed signal condition");
    assert_eq!(
        signal.last_result.as_ref().unwrap().status,
        proofloop::domain::models::CheckStatus::Skipped
    );
}
