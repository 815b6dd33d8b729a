//! Task repository trait
//!
//! Defines the interface for task storage operations.

use async_trait::async_trait;

use super::model::{NewTask, Task, TaskPatch};
use crate::Result;

/// Repository interface for task CRUD operations
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Get all tasks
    async fn list_all(&self) -> Result<Vec<Task>>;

    /// Get tasks whose completion flag equals `completed`
    async fn list_by_completion(&self, completed: bool) -> Result<Vec<Task>>;

    /// Get a task by ID
    async fn get(&self, id: i64) -> Result<Option<Task>>;

    /// Insert a new pending task and return the stored row
    async fn insert(&self, new_task: NewTask) -> Result<Task>;

    /// Apply the supplied fields and refresh `updated_at`.
    ///
    /// Returns `None` without touching storage when `id` does not exist.
    async fn update(&self, id: i64, patch: TaskPatch) -> Result<Option<Task>>;

    /// Delete a task by ID
    async fn delete(&self, id: i64) -> Result<bool>;
}
