//! Artifact store: timeline, iterations, diffs, transcripts, final record,
//! and the per-task cache.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{AgentMessage, Iteration, TimelineEvent};
use crate::infrastructure::persistence::atomic_io::{append_line, atomic_write, validate_component};
use crate::infrastructure::persistence::paths::TaskPaths;

/// On-disk record of a pre-iteration workspace snapshot: which repos were
/// stashed and under which stash message. Written before the agent runs and
/// removed once the snapshot is restored, so a crashed or aborted iteration
/// can find and pop its own stashes on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub repos: Vec<PathBuf>,
    pub message: String,
}

/// Append-only for timelines and event streams, atomic rewrite for
/// everything else.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    paths: TaskPaths,
}

impl ArtifactStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: TaskPaths::new(state_dir),
        }
    }

    pub fn paths(&self) -> &TaskPaths {
        &self.paths
    }

    /// Append one event to `timeline.jsonl`.
    pub async fn append_timeline(&self, task_id: Uuid, event: &TimelineEvent) -> CoreResult<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| CoreError::StorageCorruption {
                path: self.paths.timeline_path(task_id),
                reason: e.to_string(),
            })?;
        append_line(&self.paths.timeline_path(task_id), &line).await?;
        debug!(task_id = %task_id, "appended timeline event");
        Ok(())
    }

    /// Read the whole timeline. Missing file yields an empty history.
    pub async fn read_timeline(&self, task_id: Uuid) -> CoreResult<Vec<TimelineEvent>> {
        let path = self.paths.timeline_path(task_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut events = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let event = serde_json::from_str(line).map_err(|e| CoreError::StorageCorruption {
                path: path.clone(),
                reason: format!("bad timeline line: {e}"),
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Rewrite `iterations/<NNNN>/iteration.json`.
    pub async fn save_iteration(
        &self,
        task_id: Uuid,
        iteration: &Iteration,
    ) -> CoreResult<()> {
        let path = self
            .paths
            .iteration_dir(task_id, iteration.number)
            .join("iteration.json");
        let body = serde_json::to_string_pretty(iteration)
            .map_err(|e| CoreError::StorageCorruption {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        atomic_write(&path, &body).await?;
        debug!(task_id = %task_id, number = iteration.number, "saved iteration record");
        Ok(())
    }

    /// Append one agent event to `iterations/<NNNN>/agent/events.jsonl`.
    pub async fn append_agent_event(
        &self,
        task_id: Uuid,
        number: u32,
        message: &AgentMessage,
    ) -> CoreResult<()> {
        let path = self.paths.agent_events_path(task_id, number);
        let line = serde_json::to_string(message).map_err(|e| CoreError::StorageCorruption {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        append_line(&path, &line).await
    }

    /// Write the full event stream of a completed agent attempt to
    /// `iterations/<NNNN>/agent/events.jsonl`, one JSON object per line.
    /// Messages from attempts the retry policy discarded never reach this.
    pub async fn save_agent_events(
        &self,
        task_id: Uuid,
        number: u32,
        messages: &[AgentMessage],
    ) -> CoreResult<()> {
        let path = self.paths.agent_events_path(task_id, number);
        let mut body = String::new();
        for message in messages {
            let line =
                serde_json::to_string(message).map_err(|e| CoreError::StorageCorruption {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            body.push_str(&line);
            body.push('\n');
        }
        atomic_write(&path, &body).await?;
        debug!(task_id = %task_id, number, events = messages.len(), "saved agent events");
        Ok(())
    }

    /// Record the stash handles of a pre-iteration snapshot.
    pub async fn save_snapshot_manifest(
        &self,
        task_id: Uuid,
        number: u32,
        manifest: &SnapshotManifest,
    ) -> CoreResult<()> {
        let path = self.paths.snapshot_path(task_id, number);
        let body = serde_json::to_string_pretty(manifest).map_err(|e| {
            CoreError::StorageCorruption {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        atomic_write(&path, &body).await
    }

    pub async fn load_snapshot_manifest(
        &self,
        task_id: Uuid,
        number: u32,
    ) -> CoreResult<Option<SnapshotManifest>> {
        let path = self.paths.snapshot_path(task_id, number);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest =
            serde_json::from_str(&content).map_err(|e| CoreError::StorageCorruption {
                path,
                reason: e.to_string(),
            })?;
        Ok(Some(manifest))
    }

    /// Remove the snapshot manifest once its stashes are back in the tree.
    pub async fn remove_snapshot_manifest(&self, task_id: Uuid, number: u32) -> CoreResult<()> {
        match tokio::fs::remove_file(self.paths.snapshot_path(task_id, number)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_transcript(
        &self,
        task_id: Uuid,
        number: u32,
        transcript: &str,
    ) -> CoreResult<()> {
        atomic_write(&self.paths.transcript_path(task_id, number), transcript).await
    }

    /// Persist the iteration diff pair.
    pub async fn save_diff(
        &self,
        task_id: Uuid,
        number: u32,
        diff: &str,
        patch: &str,
    ) -> CoreResult<()> {
        atomic_write(&self.paths.diff_path(task_id, number), diff).await?;
        atomic_write(&self.paths.patch_path(task_id, number), patch).await?;
        debug!(task_id = %task_id, number, "saved worktree diff");
        Ok(())
    }

    /// An iteration is complete on disk once its diff has been recorded.
    pub async fn iteration_has_diff(&self, task_id: Uuid, number: u32) -> bool {
        tokio::fs::try_exists(self.paths.diff_path(task_id, number))
            .await
            .unwrap_or(false)
    }

    pub async fn iteration_dir_exists(&self, task_id: Uuid, number: u32) -> bool {
        tokio::fs::try_exists(self.paths.iteration_dir(task_id, number))
            .await
            .unwrap_or(false)
    }

    /// Preserve a crash-orphaned `events.jsonl` under the first free numbered
    /// sibling (`events.jsonl.1`, `events.jsonl.2`, ...) so the re-run can
    /// stream a fresh file.
    pub async fn archive_orphan_events(&self, task_id: Uuid, number: u32) -> CoreResult<Option<PathBuf>> {
        let events = self.paths.agent_events_path(task_id, number);
        if !tokio::fs::try_exists(&events).await.unwrap_or(false) {
            return Ok(None);
        }
        for n in 1u32.. {
            let candidate = events.with_file_name(format!("events.jsonl.{n}"));
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                tokio::fs::rename(&events, &candidate).await?;
                debug!(task_id = %task_id, number, archived = %candidate.display(), "archived orphan events");
                return Ok(Some(candidate));
            }
        }
        unreachable!("u32 sibling suffixes exhausted")
    }

    /// Write the terminal record: `final/final_result.json`, `final.diff`,
    /// `final.patch`.
    pub async fn save_final_result(
        &self,
        task_id: Uuid,
        result: &Value,
        diff: &str,
        patch: &str,
    ) -> CoreResult<()> {
        let final_dir = self.paths.final_dir(task_id);
        let body = serde_json::to_string_pretty(result)
            .map_err(|e| CoreError::StorageCorruption {
                path: final_dir.join("final_result.json"),
                reason: e.to_string(),
            })?;
        atomic_write(&final_dir.join("final_result.json"), &body).await?;
        atomic_write(&final_dir.join("final.diff"), diff).await?;
        atomic_write(&final_dir.join("final.patch"), patch).await?;
        debug!(task_id = %task_id, "saved final result");
        Ok(())
    }

    /// Save a cache entry under `cache/<key>.json`. Keys must be plain path
    /// components.
    pub async fn save_cache(&self, task_id: Uuid, key: &str, value: &Value) -> CoreResult<()> {
        validate_component(key)?;
        let path = self.paths.cache_dir(task_id).join(format!("{key}.json"));
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| CoreError::StorageCorruption {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        atomic_write(&path, &body).await
    }

    pub async fn load_cache(&self, task_id: Uuid, key: &str) -> CoreResult<Option<Value>> {
        validate_component(key)?;
        let path = self.paths.cache_dir(task_id).join(format!("{key}.json"));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_str(&content).map_err(|e| CoreError::StorageCorruption {
            path,
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }
}
