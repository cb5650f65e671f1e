//! Per-task lock.
//!
//! Cross-process coordination uses an advisory `.lock` file created with
//! `create_new`; in-process concurrency is guarded by a task-scoped set.
//! The guard releases both on drop.

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::infrastructure::persistence::paths::TaskPaths;

/// Hands out at most one [`TaskLockGuard`] per task at a time.
#[derive(Debug, Clone, Default)]
pub struct TaskLockManager {
    held: Arc<Mutex<HashSet<Uuid>>>,
}

impl TaskLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a task. Fails with `TaskBusy` when the lock file
    /// exists or another in-process driver holds the task.
    pub fn acquire(&self, paths: &TaskPaths, task_id: Uuid) -> CoreResult<TaskLockGuard> {
        {
            let mut held = self.held.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !held.insert(task_id) {
                return Err(CoreError::TaskBusy(task_id));
            }
        }

        let lock_path = paths.lock_path(task_id);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path);
        match file {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", std::process::id());
                debug!(task_id = %task_id, path = %lock_path.display(), "acquired task lock");
                Ok(TaskLockGuard {
                    manager: self.clone(),
                    task_id,
                    lock_path,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                self.release_in_process(task_id);
                Err(CoreError::TaskBusy(task_id))
            }
            Err(e) => {
                self.release_in_process(task_id);
                Err(e.into())
            }
        }
    }

    fn release_in_process(&self, task_id: Uuid) {
        let mut held = self.held.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        held.remove(&task_id);
    }
}

/// Held lock; dropping it releases the file and the in-process slot.
#[derive(Debug)]
pub struct TaskLockGuard {
    manager: TaskLockManager,
    task_id: Uuid,
    lock_path: PathBuf,
}

impl Drop for TaskLockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(task_id = %self.task_id, error = %e, "failed to remove lock file");
            }
        }
        self.manager.release_in_process(self.task_id);
        debug!(task_id = %self.task_id, "released task lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskPaths::new(dir.path());
        let manager = TaskLockManager::new();
        let task_id = Uuid::new_v4();

        let guard = manager.acquire(&paths, task_id).unwrap();
        let err = manager.acquire(&paths, task_id).unwrap_err();
        assert!(matches!(err, CoreError::TaskBusy(id) if id == task_id));

        drop(guard);
        let reacquired = manager.acquire(&paths, task_id);
        assert!(reacquired.is_ok());
    }

    #[test]
    fn stale_lock_file_from_another_process_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskPaths::new(dir.path());
        let task_id = Uuid::new_v4();
        let lock_path = paths.lock_path(task_id);
        std::fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        std::fs::write(&lock_path, "12345\n").unwrap();

        let manager = TaskLockManager::new();
        let err = manager.acquire(&paths, task_id).unwrap_err();
        assert!(matches!(err, CoreError::TaskBusy(_)));
    }

    #[test]
    fn drop_removes_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskPaths::new(dir.path());
        let manager = TaskLockManager::new();
        let task_id = Uuid::new_v4();
        let lock_path = paths.lock_path(task_id);

        let guard = manager.acquire(&paths, task_id).unwrap();
        assert!(lock_path.exists());
        drop(guard);
        assert!(!lock_path.exists());
    }
}
