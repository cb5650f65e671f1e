//! Resume after a crash mid-iteration.

mod helpers;

use std::sync::Arc;

use chrono::Utc;
use proofloop::domain::models::{
    ApprovalStatus, Condition, ConditionRole, Stage, Task, TaskStatus, TimelineEvent,
};
use proofloop::domain::ports::TaskRepository;
use proofloop::infrastructure::persistence::{ArtifactStore, JsonTaskRepository, TaskPaths};

use helpers::{build_orchestrator, init_repo, FakeAnalyzer, RecordingDiffService, ScriptedAgent};

fn stage_continue(stage: Stage) -> TimelineEvent {
    TimelineEvent::Stage {
        stage,
        started_at: Utc::now(),
        ended_at: Utc::now(),
        outcome: "continue".to_string(),
        duration_ms: 5,
    }
}

/// Crash simulation: the task is mid-delivery with `events.jsonl` flushed
/// for iteration 1 but no diff recorded. Resume must archive the orphaned
/// events, re-run the iteration from scratch, and reach Done exactly as the
/// no-crash baseline would.
#[tokio::test]
async fn resume_reruns_the_interrupted_iteration() {
    let workspace = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    init_repo(workspace.path(), &[("app.py", "print('hello')\n")]);

    // --- fabricate the crashed on-disk state -----------------------------
    let mut condition = Condition::user_added("app.py defines greet", ConditionRole::Blocking)
        .with_check_command("grep -q 'def greet' app.py");
    condition.approval = ApprovalStatus::Approved;

    let mut task = Task::new(
        "Add a greet(name) function to app.py",
        workspace.path().to_path_buf(),
    );
    task.goals = vec!["app.py exposes greet(name)".to_string()];
    task.plan = Some(proofloop::domain::models::Plan::new(
        "add greet",
        vec!["edit app.py".to_string(), "verify".to_string()],
    ));
    task.conditions = vec![condition];
    task.status = TaskStatus::Executing;

    let repo = JsonTaskRepository::new(state.path());
    repo.save(&task).await.unwrap();

    let artifacts = ArtifactStore::new(state.path());
    for stage in [
        Stage::Intake,
        Stage::Strategy,
        Stage::VerificationInventory,
        Stage::McpSelection,
        Stage::Clarification,
        Stage::Planning,
        Stage::Conditions,
        Stage::ApprovalPlanConditions,
    ] {
        artifacts.append_timeline(task.id, &stage_continue(stage)).await.unwrap();
    }
    // Iteration 1 got as far as streaming agent events, then the driver died.
    artifacts
        .append_agent_event(
            task.id,
            1,
            &proofloop::domain::models::AgentMessage::assistant("partial work"),
        )
        .await
        .unwrap();

    let paths = TaskPaths::new(state.path());
    assert!(paths.agent_events_path(task.id, 1).exists());
    assert!(!paths.diff_path(task.id, 1).exists());

    // --- resume ----------------------------------------------------------
    let agent = Arc::new(ScriptedAgent::new());
    agent.push_delivery_action(|cwd| {
        let path = cwd.join("app.py");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("\ndef greet(name):\n    return f\"Hello {name}\"\n");
        std::fs::write(path, content).unwrap();
    });

    let (orchestrator, task_repo) = build_orchestrator(
        Arc::clone(&agent) as Arc<_>,
        Arc::new(FakeAnalyzer::with_test_command("true")),
        Arc::new(RecordingDiffService::new()),
        state.path(),
    );

    let result = orchestrator.resume(task.id).await.unwrap();

    assert_eq!(result.status, TaskStatus::Done);
    assert_eq!(result.iterations, 1);

    // The orphaned stream was preserved under a numbered sibling.
    let archived = paths
        .agent_events_path(task.id, 1)
        .with_file_name("events.jsonl.1");
    assert!(archived.exists(), "orphaned events.jsonl was not archived");
    let archived_content = std::fs::read_to_string(&archived).unwrap();
    assert!(archived_content.contains("partial work"));

    // The re-run iteration is complete: fresh events and a recorded diff.
    assert!(paths.agent_events_path(task.id, 1).exists());
    assert!(paths.diff_path(task.id, 1).exists());

    let reloaded = task_repo.load(task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Done);
    assert_eq!(reloaded.iterations.len(), 1);
    assert_eq!(reloaded.iterations[0].number, 1);
}

/// Resuming a task that another driver holds fails fast with TaskBusy.
#[tokio::test]
async fn resume_respects_the_task_lock() {
    let workspace = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    init_repo(workspace.path(), &[("app.py", "print('hello')\n")]);

    let task = Task::new("demo", workspace.path().to_path_buf());
    let repo = JsonTaskRepository::new(state.path());
    repo.save(&task).await.unwrap();

    // Another process holds the lock.
    let paths = TaskPaths::new(state.path());
    let lock_path = paths.lock_path(task.id);
    std::fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
    std::fs::write(&lock_path, "999999\n").unwrap();

    let agent = Arc::new(ScriptedAgent::new());
    let (orchestrator, _repo) = build_orchestrator(
        Arc::clone(&agent) as Arc<_>,
        Arc::new(FakeAnalyzer::empty()),
        Arc::new(RecordingDiffService::new()),
        state.path(),
    );

    let err = orchestrator.resume(task.id).await.unwrap_err();
    assert!(matches!(
        err,
        proofloop::domain::errors::CoreError::TaskBusy(id) if id == task.id
    ));
}
