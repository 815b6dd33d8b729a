//! Task lifecycle service
//!
//! Validates request payloads and delegates persistence to a
//! [`TaskRepository`].

use std::sync::Arc;

use super::model::{validate_title, NewTask, Task, TaskPatch};
use super::repository::TaskRepository;
use crate::{Error, Result};

/// Lifecycle verbs over an injected task repository
#[derive(Clone)]
pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }

    /// Create a pending task
    pub async fn create_task(&self, new_task: NewTask) -> Result<Task> {
        validate_title(&new_task.title)?;
        let task = self.repo.insert(new_task).await?;
        tracing::info!(task_id = task.id, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task> {
        tracing::debug!(task_id = id, "get task");
        self.repo.get(id).await?.ok_or_else(|| not_found(id))
    }

    /// List every task, or only those matching `completed` when given
    pub async fn list_tasks(&self, completed: Option<bool>) -> Result<Vec<Task>> {
        tracing::debug!(?completed, "list tasks");
        match completed {
            Some(completed) => self.repo.list_by_completion(completed).await,
            None => self.repo.list_all().await,
        }
    }

    /// Apply a partial update. Only fields present in `patch` change.
    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        tracing::debug!(task_id = id, empty = patch.is_empty(), "update task");
        self.repo.update(id, patch).await?.ok_or_else(|| not_found(id))
    }

    /// Returns `true` when a row was removed
    pub async fn delete_task(&self, id: i64) -> Result<bool> {
        let removed = self.repo.delete(id).await?;
        if removed {
            tracing::info!(task_id = id, "task deleted");
        } else {
            tracing::warn!(task_id = id, "delete of unknown task");
        }
        Ok(removed)
    }

    pub async fn mark_completed(&self, id: i64) -> Result<Task> {
        self.update_task(id, TaskPatch::completed(true)).await
    }

    pub async fn mark_pending(&self, id: i64) -> Result<Task> {
        self.update_task(id, TaskPatch::completed(false)).await
    }
}

fn not_found(id: i64) -> Error {
    tracing::warn!(task_id = id, "task not found");
    Error::TaskNotFound(id)
}
