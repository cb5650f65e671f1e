//! Multi-repository workspace: per-repo stashes and aggregated diffs.

mod helpers;

use std::sync::Arc;

use proofloop::domain::models::{Condition, ConditionRole, TaskStatus};
use proofloop::infrastructure::persistence::TaskPaths;
use proofloop::services::TaskInput;

use helpers::{build_orchestrator, init_repo, FakeAnalyzer, RecordingDiffService, ScriptedAgent};

#[tokio::test]
async fn version_bump_across_two_repos() {
    let workspace = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    let frontend = workspace.path().join("frontend");
    let backend = workspace.path().join("backend");
    init_repo(&frontend, &[("VERSION", "1.0\n")]);
    init_repo(&backend, &[("VERSION", "1.0\n")]);

    // Iteration 1 bumps only the frontend (blocking check still fails);
    // iteration 2 bumps the backend too.
    let agent = Arc::new(ScriptedAgent::new());
    agent.push_delivery_action(|cwd| {
        std::fs::write(cwd.join("frontend/VERSION"), "1.1\n").unwrap();
    });
    agent.push_delivery_action(|cwd| {
        std::fs::write(cwd.join("backend/VERSION"), "1.1\n").unwrap();
    });

    let diff_service = Arc::new(RecordingDiffService::new());
    let (orchestrator, _repo) = build_orchestrator(
        Arc::clone(&agent) as Arc<_>,
        Arc::new(FakeAnalyzer::empty()),
        Arc::clone(&diff_service) as Arc<_>,
        state.path(),
    );

    let mut input = TaskInput::new("Bump version in both packages", workspace.path());
    input.conditions = vec![Condition::user_added(
        "both packages declare 1.1",
        ConditionRole::Blocking,
    )
    .with_check_command("grep -q 1.1 frontend/VERSION && grep -q 1.1 backend/VERSION")];

    let result = orchestrator.run(input).await.unwrap();

    assert_eq!(result.status, TaskStatus::Done);
    assert_eq!(result.iterations, 2);
    // One line changed per repo, summed across the workspace.
    assert_eq!(result.files_changed, 2);
    assert_eq!(result.insertions, 2);
    assert_eq!(result.deletions, 2);

    // The dirty frontend repo was stashed at iteration 2's entry and popped
    // back once the agent attempt completed.
    let messages = diff_service.stash_messages();
    assert!(
        messages.iter().any(|m| m == "proofloop: pre-iteration 2"),
        "expected a pre-iteration stash, saw {messages:?}"
    );
    let pops = diff_service.pop_calls.lock().unwrap().len();
    assert!(pops >= 1, "snapshot stash was never restored");

    // No snapshot manifest survives a cleanly finished task.
    assert!(!TaskPaths::new(state.path())
        .snapshot_path(result.task_id, 2)
        .exists());

    // The final diff carries one section per repository.
    let paths = TaskPaths::new(state.path());
    let final_diff =
        std::fs::read_to_string(paths.final_dir(result.task_id).join("final.diff")).unwrap();
    assert!(final_diff.contains("# repo:"));
    assert!(final_diff.contains("frontend"));
    assert!(final_diff.contains("backend"));
    assert!(final_diff.contains("+1.1"));
}
