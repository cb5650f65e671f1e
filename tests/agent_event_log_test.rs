//! The durable event log records only the completed agent attempt: a
//! transient failure mid-stream retries without splicing its partial output
//! into `events.jsonl`.

mod helpers;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use proofloop::domain::errors::{CoreError, CoreResult};
use proofloop::domain::models::{
    AgentMessage, AgentResult, Condition, ConditionRole, McpServerConfig, TaskStatus, ToolName,
};
use proofloop::domain::ports::{AgentProvider, MessageCallback};
use proofloop::infrastructure::agent::RetryPolicy;
use proofloop::infrastructure::persistence::TaskPaths;
use proofloop::services::TaskInput;

use helpers::{build_orchestrator, init_repo, FakeAnalyzer, RecordingDiffService, ScriptedAgent};

/// Wraps the scripted agent in the shared retry policy and fails the first
/// delivery attempt after streaming a partial message, the way a real
/// provider dies mid-stream on a connection reset.
struct FlakyDeliveryAgent {
    inner: ScriptedAgent,
    retry: RetryPolicy,
    delivery_attempts: AtomicU32,
}

impl FlakyDeliveryAgent {
    fn new(inner: ScriptedAgent) -> Self {
        Self {
            inner,
            retry: RetryPolicy {
                transient_initial: Duration::from_millis(1),
                transient_cap: Duration::from_millis(4),
                rate_limit_fallback: Duration::from_millis(1),
                min_wait: Duration::from_millis(1),
                max_wait: Duration::from_millis(5),
                ..RetryPolicy::default()
            },
            delivery_attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AgentProvider for FlakyDeliveryAgent {
    async fn execute(
        &self,
        prompt: &str,
        allowed_tools: &[ToolName],
        cwd: &Path,
        on_message: Option<MessageCallback>,
        mcp_servers: &BTreeMap<String, McpServerConfig>,
    ) -> CoreResult<AgentResult> {
        self.retry
            .execute(|| {
                let on_message = on_message.clone();
                async move {
                    if prompt.contains("You are implementing a coding task")
                        && self.delivery_attempts.fetch_add(1, Ordering::SeqCst) == 0
                    {
                        if let Some(callback) = &on_message {
                            callback(&AgentMessage::assistant(
                                "partial output from doomed attempt",
                            ));
                        }
                        return Err(CoreError::Provider(
                            "connection reset by peer".to_string(),
                        ));
                    }
                    self.inner
                        .execute(prompt, allowed_tools, cwd, on_message, mcp_servers)
                        .await
                }
            })
            .await
    }

    fn stream(
        &self,
        _prompt: String,
        _allowed_tools: Vec<ToolName>,
        _cwd: &Path,
        _mcp_servers: BTreeMap<String, McpServerConfig>,
    ) -> BoxStream<'static, CoreResult<AgentMessage>> {
        futures::stream::empty().boxed()
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn event_log_holds_only_the_successful_attempt() {
    let workspace = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    init_repo(workspace.path(), &[("app.py", "print('hello')\n")]);

    let inner = ScriptedAgent::new();
    inner.push_delivery_action(|cwd| {
        let path = cwd.join("app.py");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("\ndef greet(name):\n    return f\"Hello {name}\"\n");
        std::fs::write(path, content).unwrap();
    });
    let agent = Arc::new(FlakyDeliveryAgent::new(inner));

    let (orchestrator, _repo) = build_orchestrator(
        Arc::clone(&agent) as Arc<_>,
        Arc::new(FakeAnalyzer::empty()),
        Arc::new(RecordingDiffService::new()),
        state.path(),
    );

    let mut input = TaskInput::new("Add a greet(name) function to app.py", workspace.path());
    input.conditions = vec![Condition::user_added(
        "app.py defines greet",
        ConditionRole::Blocking,
    )
    .with_check_command("grep -q 'def greet' app.py")];

    let result = orchestrator.run(input).await.unwrap();
    assert_eq!(result.status, TaskStatus::Done);
    // First attempt failed, retry succeeded; the task saw one iteration.
    assert_eq!(result.iterations, 1);
    assert_eq!(agent.delivery_attempts.load(Ordering::SeqCst), 2);

    // events.jsonl carries only the completed attempt's stream.
    let paths = TaskPaths::new(state.path());
    let events =
        std::fs::read_to_string(paths.agent_events_path(result.task_id, 1)).unwrap();
    assert!(
        !events.contains("doomed attempt"),
        "failed attempt leaked into the event log: {events}"
    );
    assert!(events.contains("Implementation pass finished."));

    // The transcript is built from the same completed attempt.
    let transcript =
        std::fs::read_to_string(paths.transcript_path(result.task_id, 1)).unwrap();
    assert!(!transcript.contains("doomed attempt"));
}
