//! End-to-end happy path: single repo, one blocking condition, auto-approve.

mod helpers;

use std::sync::Arc;

use proofloop::domain::models::{Condition, ConditionRole, TaskStatus};
use proofloop::domain::ports::TaskRepository;
use proofloop::infrastructure::persistence::TaskPaths;
use proofloop::services::TaskInput;

use helpers::{build_orchestrator, init_repo, FakeAnalyzer, RecordingDiffService, ScriptedAgent};

#[tokio::test]
async fn single_repo_task_reaches_done() {
    let workspace = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    init_repo(workspace.path(), &[("app.py", "print('hello')\n")]);

    let agent = Arc::new(ScriptedAgent::new());
    agent.push_delivery_action(|cwd| {
        let path = cwd.join("app.py");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("\n\ndef greet(name):\n    return f\"Hello {name}\"\n");
        std::fs::write(path, content).unwrap();
    });

    let (orchestrator, task_repo) = build_orchestrator(
        Arc::clone(&agent) as Arc<_>,
        Arc::new(FakeAnalyzer::with_test_command("true")),
        Arc::new(RecordingDiffService::new()),
        state.path(),
    );

    let mut input = TaskInput::new(
        "Add a greet(name) function to app.py and tests",
        workspace.path(),
    );
    input.baseline = true;
    input.conditions = vec![Condition::user_added(
        "app.py defines greet",
        ConditionRole::Blocking,
    )
    .with_check_command("grep -q 'def greet' app.py")];

    let result = orchestrator.run(input).await.unwrap();

    assert_eq!(result.status, TaskStatus::Done);
    assert_eq!(result.exit_code(), 0);
    assert!(result.iterations <= 3);
    assert!(result.files_changed >= 1);
    assert!(result
        .conditions_passed
        .iter()
        .any(|c| c.contains("greet")));

    // The workspace actually holds the change.
    let content = std::fs::read_to_string(workspace.path().join("app.py")).unwrap();
    assert!(content.contains("def greet"));

    // Durable record: final_result.json agrees with the in-memory status.
    let paths = TaskPaths::new(state.path());
    let final_path = paths.final_dir(result.task_id).join("final_result.json");
    let final_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&final_path).unwrap()).unwrap();
    assert_eq!(final_json["status"], "done");
    assert_eq!(final_json["reason"], "completed");

    // Final diff is non-empty and was written.
    let final_diff = std::fs::read_to_string(paths.final_dir(result.task_id).join("final.diff")).unwrap();
    assert!(final_diff.contains("def greet"));

    // Task aggregate persisted with contiguous iteration numbering.
    let task = task_repo.load(result.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    for (i, iteration) in task.iterations.iter().enumerate() {
        assert_eq!(iteration.number, i as u32 + 1);
    }

    // Evidence pair exists for the blocking condition with a last.json index.
    let condition_id = task.conditions.iter().find(|c| c.gates_completion()).unwrap().id;
    let checks_dir = paths.checks_dir(result.task_id, 1, condition_id);
    assert!(checks_dir.join("last.json").exists());
    let last: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(checks_dir.join("last.json")).unwrap())
            .unwrap();
    let latest = last["latest_result"].as_str().unwrap();
    assert!(checks_dir.join(latest).exists());
    assert!(checks_dir
        .join(latest.replace(".json", ".log"))
        .exists());

    // Baseline evidence was recorded for the discovered test command.
    let baseline_dir = paths.task_dir(result.task_id).join("inventory/baseline");
    let baseline_entries = std::fs::read_dir(&baseline_dir).unwrap().count();
    assert_eq!(baseline_entries, 1);

    // Lock was released at terminal status.
    assert!(!paths.lock_path(result.task_id).exists());
}
