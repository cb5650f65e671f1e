//! JSON task repository.
//!
//! The task aggregate lives at `tasks/<task_id_hex>/task.json`, rewritten
//! atomically on every save.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::Task;
use crate::domain::ports::TaskRepository;
use crate::infrastructure::persistence::atomic_io::atomic_write;
use crate::infrastructure::persistence::paths::TaskPaths;

#[derive(Debug, Clone)]
pub struct JsonTaskRepository {
    paths: TaskPaths,
}

impl JsonTaskRepository {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: TaskPaths::new(state_dir),
        }
    }
}

#[async_trait]
impl TaskRepository for JsonTaskRepository {
    async fn load(&self, id: Uuid) -> CoreResult<Option<Task>> {
        let path = self.paths.task_file(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let task = serde_json::from_str(&content).map_err(|e| CoreError::StorageCorruption {
            path,
            reason: e.to_string(),
        })?;
        Ok(Some(task))
    }

    async fn save(&self, task: &Task) -> CoreResult<()> {
        let path = self.paths.task_file(task.id);
        let body = serde_json::to_string_pretty(task).map_err(|e| CoreError::StorageCorruption {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        atomic_write(&path, &body).await?;
        debug!(task_id = %task.id, status = task.status.as_str(), "saved task");
        Ok(())
    }

    async fn list(&self) -> CoreResult<Vec<Task>> {
        let tasks_dir = self.paths.state_dir().join("tasks");
        let mut entries = match tokio::fs::read_dir(&tasks_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tasks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let task_file = entry.path().join("task.json");
            let content = match tokio::fs::read_to_string(&task_file).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let task: Task =
                serde_json::from_str(&content).map_err(|e| CoreError::StorageCorruption {
                    path: task_file,
                    reason: e.to_string(),
                })?;
            tasks.push(task);
        }
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}
