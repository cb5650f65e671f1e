//! Task repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::Task;

/// Persistent map from task id to the task aggregate.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> CoreResult<Option<Task>>;

    async fn save(&self, task: &Task) -> CoreResult<()>;

    /// All persisted tasks, ordered by creation time.
    async fn list(&self) -> CoreResult<Vec<Task>>;
}
