//! SQLite-backed task storage implementation
//!
//! Stores tasks as rows of a single `tasks` table.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use super::model::{NewTask, Priority, Task, TaskPatch};
use super::repository::TaskRepository;
use crate::{Error, Result};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT    NOT NULL CHECK (length(title) BETWEEN 1 AND 255),
    description TEXT,
    due_date    DATETIME,
    priority    TEXT,
    completed   BOOLEAN NOT NULL DEFAULT 0,
    created_at  DATETIME NOT NULL,
    updated_at  DATETIME NOT NULL
)
"#;

const SELECT_ALL: &str = "SELECT id, title, description, due_date, priority, completed, \
     created_at, updated_at FROM tasks ORDER BY id";

const SELECT_BY_COMPLETION: &str = "SELECT id, title, description, due_date, priority, \
     completed, created_at, updated_at FROM tasks WHERE completed = ? ORDER BY id";

const SELECT_ONE: &str = "SELECT id, title, description, due_date, priority, completed, \
     created_at, updated_at FROM tasks WHERE id = ?";

const INSERT: &str = "INSERT INTO tasks \
     (title, description, due_date, priority, completed, created_at, updated_at) \
     VALUES (?, ?, ?, ?, 0, ?, ?) \
     RETURNING id, title, description, due_date, priority, completed, created_at, updated_at";

// COALESCE keeps the stored value for every column whose bind is NULL.
// Timestamps are RFC 3339 text in UTC, so MAX orders them chronologically
// and keeps updated_at >= created_at if the wall clock steps backwards.
const UPDATE: &str = "UPDATE tasks SET \
     title = COALESCE(?, title), \
     description = COALESCE(?, description), \
     due_date = COALESCE(?, due_date), \
     priority = COALESCE(?, priority), \
     completed = COALESCE(?, completed), \
     updated_at = MAX(?, created_at) \
     WHERE id = ? \
     RETURNING id, title, description, due_date, priority, completed, created_at, updated_at";

const DELETE: &str = "DELETE FROM tasks WHERE id = ?";

/// Raw `tasks` row; `priority` is free text at this layer
#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    title: String,
    description: Option<String>,
    due_date: Option<NaiveDateTime>,
    priority: Option<String>,
    completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        let priority = row
            .priority
            .as_deref()
            .map(Priority::from_str)
            .transpose()
            .map_err(|e| Error::Storage(format!("Task {} has a malformed row: {}", row.id, e)))?;

        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            due_date: row.due_date,
            priority,
            completed: row.completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_tasks(rows: Vec<TaskRow>) -> Result<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

/// Task store over an SQLite connection pool
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Connect to `url` and make sure the schema exists.
    ///
    /// The database file (and its parent directory) is created when missing.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::StorageUnavailable(sqlx::Error::Io(e)))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// Pinned to a single long-lived connection, since every SQLite
    /// in-memory connection sees its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self::from_pool(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The schema is not touched.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `tasks` table if it does not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        tracing::debug!("tasks schema ready");
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskStore {
    async fn list_all(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(SELECT_ALL)
            .fetch_all(&self.pool)
            .await?;
        into_tasks(rows)
    }

    async fn list_by_completion(&self, completed: bool) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(SELECT_BY_COMPLETION)
            .bind(completed)
            .fetch_all(&self.pool)
            .await?;
        into_tasks(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(SELECT_ONE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn insert(&self, new_task: NewTask) -> Result<Task> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, TaskRow>(INSERT)
            .bind(new_task.title)
            .bind(new_task.description)
            .bind(new_task.due_date)
            .bind(new_task.priority.map(|p| p.as_str()))
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Task::try_from(row)
    }

    async fn update(&self, id: i64, patch: TaskPatch) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(UPDATE)
            .bind(patch.title)
            .bind(patch.description)
            .bind(patch.due_date)
            .bind(patch.priority.map(|p| p.as_str()))
            .bind(patch.completed)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(DELETE).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn create_test_store() -> SqliteTaskStore {
        SqliteTaskStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_task() {
        let store = create_test_store().await;

        let due = NaiveDate::from_ymd_opt(2030, 1, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let created = store
            .insert(
                NewTask::new("Test task")
                    .with_description("A test description")
                    .with_due_date(due)
                    .with_priority(Priority::Medium),
            )
            .await
            .unwrap();

        assert!(created.id > 0);
        assert_eq!(created.title, "Test task");
        assert_eq!(created.description, Some("A test description".to_string()));
        assert_eq!(created.due_date, Some(due));
        assert_eq!(created.priority, Some(Priority::Medium));
        assert!(!created.completed);
        assert_eq!(created.created_at, created.updated_at);
    }

    #[tokio::test]
    async fn test_get_round_trip() {
        let store = create_test_store().await;

        let created = store
            .insert(NewTask::new("Test task").with_priority(Priority::High))
            .await
            .unwrap();

        let retrieved = store.get(created.id).await.unwrap();
        assert_eq!(retrieved, Some(created));

        // Test non-existent task
        let non_existent = store.get(9999).await.unwrap();
        assert!(non_existent.is_none());
    }

    #[tokio::test]
    async fn test_list_all() {
        let store = create_test_store().await;

        store.insert(NewTask::new("Task 1")).await.unwrap();
        store.insert(NewTask::new("Task 2")).await.unwrap();
        store.insert(NewTask::new("Task 3")).await.unwrap();

        let tasks = store.list_all().await.unwrap();
        assert_eq!(tasks.len(), 3);
    }

    #[tokio::test]
    async fn test_update_only_touches_supplied_fields() {
        let store = create_test_store().await;

        let task = store
            .insert(
                NewTask::new("A")
                    .with_description("keep me")
                    .with_priority(Priority::Low),
            )
            .await
            .unwrap();

        let updated = store
            .update(task.id, TaskPatch::default().with_title("B"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "B");
        assert_eq!(updated.priority, Some(Priority::Low));
        assert_eq!(updated.description, Some("keep me".to_string()));
        assert_eq!(updated.created_at, task.created_at);
        assert!(updated.updated_at >= updated.created_at);

        // Verify persistence
        let retrieved = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(retrieved, updated);
    }

    #[tokio::test]
    async fn test_empty_patch_only_refreshes_updated_at() {
        let store = create_test_store().await;

        let task = store
            .insert(NewTask::new("Unchanged").with_priority(Priority::High))
            .await
            .unwrap();

        let updated = store
            .update(task.id, TaskPatch::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, task.id);
        assert_eq!(updated.title, task.title);
        assert_eq!(updated.description, task.description);
        assert_eq!(updated.due_date, task.due_date);
        assert_eq!(updated.priority, task.priority);
        assert_eq!(updated.completed, task.completed);
        assert_eq!(updated.created_at, task.created_at);
        assert!(updated.updated_at >= task.updated_at);
    }

    #[tokio::test]
    async fn test_update_never_moves_before_created_at() {
        let store = create_test_store().await;

        let task = store.insert(NewTask::new("Clock skew")).await.unwrap();

        // Pretend the task was created by a host whose clock ran ahead
        let future = Utc::now() + chrono::Duration::days(1);
        sqlx::query("UPDATE tasks SET created_at = ?, updated_at = ? WHERE id = ?")
            .bind(future)
            .bind(future)
            .bind(task.id)
            .execute(&store.pool)
            .await
            .unwrap();

        let updated = store
            .update(task.id, TaskPatch::default().with_title("Still valid"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.created_at, future);
        assert!(updated.updated_at >= updated.created_at);
    }

    #[tokio::test]
    async fn test_update_nonexistent_task() {
        let store = create_test_store().await;

        let result = store
            .update(42, TaskPatch::default().with_title("ghost"))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_task() {
        let store = create_test_store().await;

        let task = store.insert(NewTask::new("Task to delete")).await.unwrap();

        // Verify task exists
        assert!(store.get(task.id).await.unwrap().is_some());

        let deleted = store.delete(task.id).await.unwrap();
        assert!(deleted);
        assert!(store.get(task.id).await.unwrap().is_none());

        // Delete again should return false
        let deleted_again = store.delete(task.id).await.unwrap();
        assert!(!deleted_again);
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let store = create_test_store().await;

        let first = store.insert(NewTask::new("first")).await.unwrap();
        let second = store.insert(NewTask::new("second")).await.unwrap();
        store.delete(second.id).await.unwrap();

        let third = store.insert(NewTask::new("third")).await.unwrap();
        assert!(third.id > second.id);
        assert_ne!(third.id, first.id);
    }

    #[tokio::test]
    async fn test_list_by_completion() {
        let store = create_test_store().await;

        store.insert(NewTask::new("Pending 1")).await.unwrap();
        store.insert(NewTask::new("Pending 2")).await.unwrap();
        let done = store.insert(NewTask::new("Done 1")).await.unwrap();
        store
            .update(done.id, TaskPatch::completed(true))
            .await
            .unwrap();

        let completed = store.list_by_completion(true).await.unwrap();
        let pending = store.list_by_completion(false).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(pending.len(), 2);
        assert!(completed.iter().all(|t| t.completed));
        assert!(pending.iter().all(|t| !t.completed));

        let all: HashSet<i64> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        let union: HashSet<i64> = completed.iter().chain(pending.iter()).map(|t| t.id).collect();
        assert_eq!(all, union);
    }

    #[tokio::test]
    async fn test_empty_title_violates_constraint() {
        let store = create_test_store().await;

        let result = store.insert(NewTask::new("")).await;
        match result {
            Err(Error::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
        assert!(store.list_all().await.unwrap().is_empty());

        let task = store.insert(NewTask::new("ok")).await.unwrap();
        let result = store.update(task.id, TaskPatch::default().with_title("")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.get(task.id).await.unwrap().unwrap().title, "ok");
    }

    #[tokio::test]
    async fn test_malformed_priority_row() {
        let store = create_test_store().await;

        let task = store.insert(NewTask::new("legacy")).await.unwrap();
        sqlx::query("UPDATE tasks SET priority = 'Urgent' WHERE id = ?")
            .bind(task.id)
            .execute(&store.pool)
            .await
            .unwrap();

        match store.get(task.id).await {
            Err(Error::Storage(msg)) => assert!(msg.contains("Urgent")),
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let store = create_test_store().await;
        store.close().await;

        match store.list_all().await {
            Err(Error::StorageUnavailable(_)) => {}
            other => panic!("Expected StorageUnavailable error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("tasks.db");
        let url = format!("sqlite://{}", path.display());

        let task_id;

        // Create store and add task
        {
            let store = SqliteTaskStore::connect(&url, 1).await.unwrap();
            let task = store
                .insert(
                    NewTask::new("Persistent task")
                        .with_description("Should survive reload")
                        .with_priority(Priority::High),
                )
                .await
                .unwrap();
            task_id = task.id;
            store.close().await;
        }

        // Create new store instance and verify data persisted
        {
            let store = SqliteTaskStore::connect(&url, 1).await.unwrap();
            let task = store.get(task_id).await.unwrap();
            assert!(task.is_some());
            let task = task.unwrap();
            assert_eq!(task.title, "Persistent task");
            assert_eq!(task.description, Some("Should survive reload".to_string()));
            assert_eq!(task.priority, Some(Priority::High));
        }
    }
}
