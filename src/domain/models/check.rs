//! Check specifications and results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome class of a single check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// The check command itself could not run (spawn failure, timeout).
    Error,
    /// No runnable command is associated with the condition.
    Skipped,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// What to run to verify a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub condition_id: Uuid,
    pub command: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl CheckSpec {
    pub fn new(condition_id: Uuid, command: impl Into<String>) -> Self {
        Self {
            condition_id,
            command: command.into(),
            timeout_secs: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(600))
    }
}

/// Raw output of running a check, before evidence persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutput {
    pub condition_id: Uuid,
    pub status: CheckStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Persisted check record; stdout/stderr live in the evidence log file the
/// relative paths point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub condition_id: Uuid,
    pub status: CheckStatus,
    pub exit_code: Option<i32>,
    /// Path to the `<ts>.json` artifact, relative to the state dir.
    #[serde(default)]
    pub artifact_path: Option<String>,
    /// Path to the `<ts>.log` artifact, relative to the state dir.
    #[serde(default)]
    pub log_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn from_output(output: &CheckOutput) -> Self {
        Self {
            condition_id: output.condition_id,
            status: output.status,
            exit_code: output.exit_code,
            artifact_path: None,
            log_path: None,
            timestamp: Utc::now(),
        }
    }

    /// Result without evidence references, used for skipped checks and tests.
    pub fn status_only(condition_id: Uuid, status: CheckStatus) -> Self {
        Self {
            condition_id,
            status,
            exit_code: None,
            artifact_path: None,
            log_path: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, artifact_path: String, log_path: String) -> Self {
        self.artifact_path = Some(artifact_path);
        self.log_path = Some(log_path);
        self
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_check_timeout_is_ten_minutes() {
        let spec = CheckSpec::new(Uuid::new_v4(), "pytest");
        assert_eq!(spec.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn result_carries_exit_code_from_output() {
        let out = CheckOutput {
            condition_id: Uuid::new_v4(),
            status: CheckStatus::Fail,
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "boom".into(),
            duration_ms: 12,
        };
        let res = CheckResult::from_output(&out);
        assert_eq!(res.exit_code, Some(2));
        assert!(!res.passed());
    }
}
