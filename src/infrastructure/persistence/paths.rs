//! Path layout of the task state directory.
//!
//! ```text
//! <state_dir>/tasks/<task_id_hex>/
//!   timeline.jsonl
//!   task.json
//!   iterations/<NNNN>/{iteration.json, agent/, diffs/, checks/}
//!   inventory/baseline/<check_id_hex>/
//!   cache/<key>.json
//!   final/
//!   .lock
//! ```

use std::path::PathBuf;

use uuid::Uuid;

/// Maps task and iteration identifiers to filesystem paths.
#[derive(Debug, Clone)]
pub struct TaskPaths {
    state_dir: PathBuf,
}

impl TaskPaths {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &PathBuf {
        &self.state_dir
    }

    pub fn task_dir(&self, task_id: Uuid) -> PathBuf {
        self.state_dir.join("tasks").join(task_id.simple().to_string())
    }

    pub fn task_file(&self, task_id: Uuid) -> PathBuf {
        self.task_dir(task_id).join("task.json")
    }

    pub fn lock_path(&self, task_id: Uuid) -> PathBuf {
        self.task_dir(task_id).join(".lock")
    }

    pub fn timeline_path(&self, task_id: Uuid) -> PathBuf {
        self.task_dir(task_id).join("timeline.jsonl")
    }

    pub fn iterations_dir(&self, task_id: Uuid) -> PathBuf {
        self.task_dir(task_id).join("iterations")
    }

    pub fn iteration_dir(&self, task_id: Uuid, number: u32) -> PathBuf {
        self.iterations_dir(task_id).join(format!("{number:04}"))
    }

    pub fn agent_events_path(&self, task_id: Uuid, number: u32) -> PathBuf {
        self.iteration_dir(task_id, number)
            .join("agent")
            .join("events.jsonl")
    }

    pub fn transcript_path(&self, task_id: Uuid, number: u32) -> PathBuf {
        self.iteration_dir(task_id, number)
            .join("agent")
            .join("transcript.md")
    }

    pub fn snapshot_path(&self, task_id: Uuid, number: u32) -> PathBuf {
        self.iteration_dir(task_id, number).join("snapshot.json")
    }

    pub fn diff_path(&self, task_id: Uuid, number: u32) -> PathBuf {
        self.iteration_dir(task_id, number)
            .join("diffs")
            .join("worktree.diff")
    }

    pub fn patch_path(&self, task_id: Uuid, number: u32) -> PathBuf {
        self.iteration_dir(task_id, number)
            .join("diffs")
            .join("worktree.patch")
    }

    pub fn checks_dir(&self, task_id: Uuid, number: u32, condition_id: Uuid) -> PathBuf {
        self.iteration_dir(task_id, number)
            .join("checks")
            .join(condition_id.simple().to_string())
    }

    pub fn baseline_dir(&self, task_id: Uuid, check_id: Uuid) -> PathBuf {
        self.task_dir(task_id)
            .join("inventory")
            .join("baseline")
            .join(check_id.simple().to_string())
    }

    pub fn cache_dir(&self, task_id: Uuid) -> PathBuf {
        self.task_dir(task_id).join("cache")
    }

    pub fn final_dir(&self, task_id: Uuid) -> PathBuf {
        self.task_dir(task_id).join("final")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_dirs_are_zero_padded() {
        let paths = TaskPaths::new("/state");
        let id = Uuid::nil();
        let dir = paths.iteration_dir(id, 7);
        assert!(dir.ends_with("iterations/0007"));
    }

    #[test]
    fn task_dir_uses_hex_id() {
        let paths = TaskPaths::new("/state");
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert!(paths
            .task_dir(id)
            .ends_with("tasks/67e5504410b1426f9247bb680e5fe0c8"));
    }
}
