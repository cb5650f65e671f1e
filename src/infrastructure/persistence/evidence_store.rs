//! Evidence store for check artifacts.
//!
//! Every check run persists a `<ts>.json` / `<ts>.log` pair plus a
//! `last.json` index pointing at the most recent pair. Timestamps are
//! `YYYYMMDDTHHMMSSffffff` UTC so lexicographic order equals chronological
//! order.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::CheckOutput;
use crate::infrastructure::persistence::atomic_io::atomic_write;
use crate::infrastructure::persistence::paths::TaskPaths;

/// Content of `last.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastIndex {
    pub latest_result: String,
    pub latest_log: String,
    pub timestamp: String,
}

/// Paths of one persisted evidence pair, relative to the state dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceRefs {
    pub artifact_path: String,
    pub log_path: String,
}

#[derive(Debug, Clone)]
pub struct EvidenceStore {
    paths: TaskPaths,
}

impl EvidenceStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: TaskPaths::new(state_dir),
        }
    }

    fn timestamp_str() -> String {
        Utc::now().format("%Y%m%dT%H%M%S%6f").to_string()
    }

    /// Persist check evidence under
    /// `iterations/<NNNN>/checks/<condition_id_hex>/` and refresh `last.json`.
    pub async fn save_check_evidence(
        &self,
        task_id: Uuid,
        iteration: u32,
        output: &CheckOutput,
    ) -> CoreResult<EvidenceRefs> {
        let dir = self.paths.checks_dir(task_id, iteration, output.condition_id);
        let refs = self.write_pair(&dir, output).await?;
        debug!(
            task_id = %task_id,
            iteration,
            condition_id = %output.condition_id,
            status = output.status.as_str(),
            "saved check evidence"
        );
        Ok(refs)
    }

    /// Persist baseline evidence under `inventory/baseline/<check_id_hex>/`.
    pub async fn save_baseline_evidence(
        &self,
        task_id: Uuid,
        check_id: Uuid,
        output: &CheckOutput,
    ) -> CoreResult<EvidenceRefs> {
        let dir = self.paths.baseline_dir(task_id, check_id);
        let refs = self.write_pair(&dir, output).await?;
        debug!(task_id = %task_id, check_id = %check_id, "saved baseline evidence");
        Ok(refs)
    }

    async fn write_pair(&self, dir: &Path, output: &CheckOutput) -> CoreResult<EvidenceRefs> {
        let ts = Self::timestamp_str();
        let result_name = format!("{ts}.json");
        let log_name = format!("{ts}.log");

        let record = serde_json::json!({
            "condition_id": output.condition_id,
            "status": output.status.as_str(),
            "exit_code": output.exit_code,
            "duration_ms": output.duration_ms,
            "timestamp": ts,
        });
        let result_path = dir.join(&result_name);
        let body = serde_json::to_string_pretty(&record)
            .map_err(|e| CoreError::StorageCorruption {
                path: result_path.clone(),
                reason: e.to_string(),
            })?;
        atomic_write(&result_path, &body).await?;

        let log_path = dir.join(&log_name);
        let log_content = format!(
            "--- stdout ---\n{}\n--- stderr ---\n{}\n",
            output.stdout, output.stderr
        );
        atomic_write(&log_path, &log_content).await?;

        let index = LastIndex {
            latest_result: result_name,
            latest_log: log_name,
            timestamp: Utc::now().to_rfc3339(),
        };
        let index_body = serde_json::to_string_pretty(&index)
            .map_err(|e| CoreError::StorageCorruption {
                path: dir.join("last.json"),
                reason: e.to_string(),
            })?;
        atomic_write(&dir.join("last.json"), &index_body).await?;

        Ok(EvidenceRefs {
            artifact_path: self.relative(&result_path),
            log_path: self.relative(&log_path),
        })
    }

    /// Read the `last.json` index for a condition, when one exists.
    pub async fn read_last(
        &self,
        task_id: Uuid,
        iteration: u32,
        condition_id: Uuid,
    ) -> CoreResult<Option<LastIndex>> {
        let path = self
            .paths
            .checks_dir(task_id, iteration, condition_id)
            .join("last.json");
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let index = serde_json::from_str(&content).map_err(|e| CoreError::StorageCorruption {
            path,
            reason: e.to_string(),
        })?;
        Ok(Some(index))
    }

    /// Trailing log content for a condition's most recent check, used to
    /// feed failing output back into the next iteration's prompt.
    pub async fn read_last_log(
        &self,
        task_id: Uuid,
        iteration: u32,
        condition_id: Uuid,
        max_bytes: usize,
    ) -> CoreResult<Option<String>> {
        let Some(index) = self.read_last(task_id, iteration, condition_id).await? else {
            return Ok(None);
        };
        let path = self
            .paths
            .checks_dir(task_id, iteration, condition_id)
            .join(&index.latest_log);
        let content = tokio::fs::read_to_string(&path).await?;
        let tail = if content.len() > max_bytes {
            let cut = content.len() - max_bytes;
            let start = content
                .char_indices()
                .map(|(i, _)| i)
                .find(|&i| i >= cut)
                .unwrap_or(0);
            content[start..].to_string()
        } else {
            content
        };
        Ok(Some(tail))
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(self.paths.state_dir())
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
