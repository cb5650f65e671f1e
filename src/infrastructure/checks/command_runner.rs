//! Shell-command check runner.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::errors::CoreResult;
use crate::domain::models::{CheckOutput, CheckSpec, CheckStatus};
use crate::domain::ports::CheckRunner;

/// Runs a condition's command through `sh -c` with a timeout. Exit 0 is
/// Pass, any other exit is Fail; spawn failures and timeouts are Error.
#[derive(Debug, Clone, Default)]
pub struct CommandCheckRunner;

impl CommandCheckRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CheckRunner for CommandCheckRunner {
    async fn run(&self, spec: &CheckSpec, cwd: &Path) -> CoreResult<CheckOutput> {
        let started = Instant::now();
        debug!(condition_id = %spec.condition_id, command = %spec.command, "running check");

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&spec.command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %spec.command, error = %e, "check command failed to spawn");
                return Ok(CheckOutput {
                    condition_id: spec.condition_id,
                    status: CheckStatus::Error,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn: {e}"),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        let output = match timeout(spec.timeout(), child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(CheckOutput {
                    condition_id: spec.condition_id,
                    status: CheckStatus::Error,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to collect output: {e}"),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(_) => {
                warn!(command = %spec.command, timeout_secs = spec.timeout().as_secs(), "check timed out");
                return Ok(CheckOutput {
                    condition_id: spec.condition_id,
                    status: CheckStatus::Error,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("timed out after {}s", spec.timeout().as_secs()),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        let exit_code = output.status.code();
        let status = if output.status.success() {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        };
        Ok(CheckOutput {
            condition_id: spec.condition_id,
            status,
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn passing_command_is_pass() {
        let runner = CommandCheckRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let spec = CheckSpec::new(Uuid::new_v4(), "true");
        let out = runner.run(&spec, dir.path()).await.unwrap();
        assert_eq!(out.status, CheckStatus::Pass);
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let runner = CommandCheckRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let spec = CheckSpec::new(Uuid::new_v4(), "exit 3");
        let out = runner.run(&spec, dir.path()).await.unwrap();
        assert_eq!(out.status, CheckStatus::Fail);
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let runner = CommandCheckRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let spec = CheckSpec::new(Uuid::new_v4(), "echo out; echo err >&2; exit 1");
        let out = runner.run(&spec, dir.path()).await.unwrap();
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn timeout_is_an_error_status() {
        let runner = CommandCheckRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let mut spec = CheckSpec::new(Uuid::new_v4(), "sleep 5");
        spec.timeout_secs = Some(1);
        let out = runner.run(&spec, dir.path()).await.unwrap();
        assert_eq!(out.status, CheckStatus::Error);
        assert!(out.stderr.contains("timed out"));
    }
}
