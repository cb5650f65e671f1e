//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use proofloop::domain::errors::{CoreError, CoreResult};
use proofloop::domain::models::{
    AgentMessage, AgentResult, CommandKind, DiffResult, McpServerConfig, ProjectAnalysis,
    ToolName,
};
use proofloop::domain::ports::{
    AgentProvider, DiffService, MessageCallback, ProjectAnalyzerPort,
};
use proofloop::infrastructure::git::GitDiffAdapter;

// ---------------------------------------------------------------------------
// Git fixtures

pub fn git(repo: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Run git and return its stdout.
pub fn git_output(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Initialize a repository with an identity and one commit of `files`.
pub fn init_repo(repo: &Path, files: &[(&str, &str)]) {
    std::fs::create_dir_all(repo).unwrap();
    git(repo, &["init", "-q"]);
    git(repo, &["config", "user.email", "test@example.com"]);
    git(repo, &["config", "user.name", "Test"]);
    for (name, content) in files {
        let path = repo.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
    if !files.is_empty() {
        git(repo, &["add", "."]);
        git(repo, &["commit", "-q", "-m", "initial"]);
    }
}

// ---------------------------------------------------------------------------
// Scripted agent

/// One scripted delivery iteration: a workspace mutation or a failure.
enum DeliveryStep {
    Act(Box<dyn Fn(&Path) + Send + Sync>),
    Fail(fn() -> CoreError),
}

/// Agent fake that answers stage prompts with canned JSON and runs scripted
/// workspace mutations (or failures) for delivery iterations.
pub struct ScriptedAgent {
    pub intake_json: String,
    pub strategy_text: String,
    pub clarifications_json: String,
    pub plan_json: String,
    pub conditions_json: String,
    delivery_steps: Mutex<VecDeque<DeliveryStep>>,
    /// When set, every call fails with this error (rebuilt per call).
    fail_every_call: Option<fn() -> CoreError>,
    pub calls: AtomicU32,
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self {
            intake_json: r#"{"goals": ["complete the requested change"], "constraints": []}"#
                .to_string(),
            strategy_text: "Modify the existing code in place and verify with the project's own checks.".to_string(),
            clarifications_json: r#"{"questions": []}"#.to_string(),
            plan_json: r#"{"goal": "make the change", "steps": ["inspect the code", "apply the change", "verify"], "boundaries": []}"#.to_string(),
            conditions_json: r#"{"conditions": [{"description": "change reviewed in the diff", "role": "signal", "check_command": null}]}"#.to_string(),
            delivery_steps: Mutex::new(VecDeque::new()),
            fail_every_call: None,
            calls: AtomicU32::new(0),
        }
    }
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(error: fn() -> CoreError) -> Self {
        Self {
            fail_every_call: Some(error),
            ..Self::default()
        }
    }

    pub fn with_plan_json(mut self, plan_json: impl Into<String>) -> Self {
        self.plan_json = plan_json.into();
        self
    }

    pub fn with_conditions_json(mut self, conditions_json: impl Into<String>) -> Self {
        self.conditions_json = conditions_json.into();
        self
    }

    /// Queue a workspace mutation for the next delivery iteration.
    pub fn push_delivery_action(&self, action: impl Fn(&Path) + Send + Sync + 'static) {
        self.delivery_steps
            .lock()
            .unwrap()
            .push_back(DeliveryStep::Act(Box::new(action)));
    }

    /// Queue a failing delivery iteration.
    pub fn push_delivery_failure(&self, error: fn() -> CoreError) {
        self.delivery_steps
            .lock()
            .unwrap()
            .push_back(DeliveryStep::Fail(error));
    }

    fn respond(&self, prompt: &str, cwd: &Path) -> CoreResult<String> {
        if prompt.contains("Normalize this coding task") {
            return Ok(self.intake_json.clone());
        }
        if prompt.contains("pick the high-level approach") {
            return Ok(self.strategy_text.clone());
        }
        if prompt.contains("ambiguous enough to ask") {
            return Ok(self.clarifications_json.clone());
        }
        if prompt.contains("Create an implementation plan") {
            return Ok(self.plan_json.clone());
        }
        if prompt.contains("Propose completion conditions") {
            return Ok(self.conditions_json.clone());
        }
        if prompt.contains("You are implementing a coding task") {
            match self.delivery_steps.lock().unwrap().pop_front() {
                Some(DeliveryStep::Act(action)) => action(cwd),
                Some(DeliveryStep::Fail(error)) => return Err(error()),
                None => {}
            }
            return Ok("Implementation pass finished.".to_string());
        }
        Ok("ok".to_string())
    }
}

#[async_trait]
impl AgentProvider for ScriptedAgent {
    async fn execute(
        &self,
        prompt: &str,
        _allowed_tools: &[ToolName],
        cwd: &Path,
        on_message: Option<MessageCallback>,
        _mcp_servers: &BTreeMap<String, McpServerConfig>,
    ) -> CoreResult<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_every_call {
            return Err(error());
        }
        let text = self.respond(prompt, cwd)?;
        let message = AgentMessage::assistant(text);
        if let Some(callback) = &on_message {
            callback(&message);
        }
        Ok(AgentResult::from_messages(vec![message], None))
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
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Fake analyzer

/// Analyzer fake returning a fixed inventory without touching the agent.
pub struct FakeAnalyzer(pub ProjectAnalysis);

impl FakeAnalyzer {
    pub fn with_test_command(command: &str) -> Self {
        let mut analysis = ProjectAnalysis::default();
        analysis
            .commands
            .insert(CommandKind::Test, command.to_string());
        Self(analysis)
    }

    pub fn empty() -> Self {
        Self(ProjectAnalysis::default())
    }
}

#[async_trait]
impl ProjectAnalyzerPort for FakeAnalyzer {
    async fn analyze(
        &self,
        _path: &Path,
        _on_message: Option<MessageCallback>,
    ) -> ProjectAnalysis {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Recording diff service

/// Wraps the real git adapter and records stash traffic.
pub struct RecordingDiffService {
    inner: GitDiffAdapter,
    pub stash_calls: Mutex<Vec<(PathBuf, String)>>,
    pub pop_calls: Mutex<Vec<PathBuf>>,
}

impl RecordingDiffService {
    pub fn new() -> Self {
        Self {
            inner: GitDiffAdapter::new(),
            stash_calls: Mutex::new(Vec::new()),
            pop_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn stash_messages(&self) -> Vec<String> {
        self.stash_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl DiffService for RecordingDiffService {
    async fn worktree_diff(&self, repo_path: &Path) -> CoreResult<DiffResult> {
        self.inner.worktree_diff(repo_path).await
    }

    async fn staged_diff(&self, repo_path: &Path) -> CoreResult<DiffResult> {
        self.inner.staged_diff(repo_path).await
    }

    async fn stash_changes(&self, repo_path: &Path, message: &str) -> CoreResult<String> {
        self.stash_calls
            .lock()
            .unwrap()
            .push((repo_path.to_path_buf(), message.to_string()));
        self.inner.stash_changes(repo_path, message).await
    }

    async fn pop_stash(&self, repo_path: &Path) -> CoreResult<()> {
        self.pop_calls.lock().unwrap().push(repo_path.to_path_buf());
        self.inner.pop_stash(repo_path).await
    }

    async fn is_repo(&self, path: &Path) -> bool {
        self.inner.is_repo(path).await
    }

    async fn has_head(&self, repo_path: &Path) -> bool {
        self.inner.has_head(repo_path).await
    }
}

// ---------------------------------------------------------------------------
// Orchestrator wiring

/// Wire an orchestrator over the real stores and check runner with the given
/// fakes, auto-approving every gate.
pub fn build_orchestrator(
    agent: std::sync::Arc<dyn AgentProvider>,
    analyzer: std::sync::Arc<dyn ProjectAnalyzerPort>,
    diff_service: std::sync::Arc<dyn DiffService>,
    state_dir: &Path,
) -> (
    proofloop::services::Orchestrator,
    std::sync::Arc<proofloop::infrastructure::persistence::JsonTaskRepository>,
) {
    use proofloop::domain::models::Config;
    use proofloop::domain::ports::AutoApproveGateway;
    use proofloop::infrastructure::checks::CommandCheckRunner;
    use proofloop::infrastructure::persistence::JsonTaskRepository;
    use proofloop::services::Orchestrator;
    use std::sync::Arc;

    let task_repo = Arc::new(JsonTaskRepository::new(state_dir));
    let orchestrator = Orchestrator::new(
        agent,
        analyzer,
        Arc::new(CommandCheckRunner::new()),
        diff_service,
        Arc::clone(&task_repo) as Arc<dyn proofloop::domain::ports::TaskRepository>,
        Arc::new(AutoApproveGateway),
        state_dir.to_path_buf(),
        None,
        Config::default(),
    );
    (orchestrator, task_repo)
}
