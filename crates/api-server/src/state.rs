//! Application state

use std::sync::Arc;

use taskmgr_core::task::{SqliteTaskStore, TaskRepository, TaskService};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    task_service: TaskService,
}

impl AppState {
    /// Connect the task store described by `config`
    pub async fn new(config: &Config) -> taskmgr_core::Result<Self> {
        let store = SqliteTaskStore::connect(&config.database_url, config.db_max_connections).await?;
        Ok(Self::with_repository(Arc::new(store)))
    }

    /// Build state around an already constructed repository
    pub fn with_repository(repo: Arc<dyn TaskRepository>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                task_service: TaskService::new(repo),
            }),
        }
    }

    /// Get reference to the task service
    pub fn task_service(&self) -> &TaskService {
        &self.inner.task_service
    }
}
