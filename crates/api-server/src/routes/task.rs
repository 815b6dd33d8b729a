//! Task API endpoints
//!
//! RESTful API for the task lifecycle.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{de, Deserialize, Deserializer, Serialize};

use taskmgr_core::task::{NewTask, Priority, Task, TaskPatch};
use taskmgr_core::Error;

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub completed: Option<bool>,
}

/// Accepts the usual query-string spellings of a boolean
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(de::Error::custom(format!(
            "invalid boolean value '{}'",
            value
        ))),
    })
    .transpose()
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDateTime>,
    pub priority: Option<Priority>,
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            due_date: task.due_date,
            priority: task.priority,
            completed: task.completed,
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::TaskNotFound(_) => StatusCode::NOT_FOUND,
        Error::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!("Task request failed: {}", err);
    }

    let detail = match err {
        Error::TaskNotFound(_) => "Task not found".to_string(),
        other => other.to_string(),
    };

    (status, Json(ErrorResponse { detail }))
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

fn not_found() -> ApiError {
    error_response(StatusCode::NOT_FOUND, "Task not found")
}

fn json_rejected(rejection: JsonRejection) -> ApiError {
    error_response(rejection.status(), rejection.body_text())
}

fn query_rejected(rejection: QueryRejection) -> ApiError {
    error_response(rejection.status(), rejection.body_text())
}

fn path_rejected(rejection: PathRejection) -> ApiError {
    error_response(rejection.status(), rejection.body_text())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /tasks - List tasks, optionally filtered by completion
async fn list_tasks(
    State(state): State<AppState>,
    query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let Query(query) = query.map_err(query_rejected)?;
    let tasks = state
        .task_service()
        .list_tasks(query.completed)
        .await
        .map_err(api_error)?;

    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// POST /tasks - Create a new task
async fn create_task(
    State(state): State<AppState>,
    req: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let Json(req) = req.map_err(json_rejected)?;
    let created = state
        .task_service()
        .create_task(req)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from(created))))
}

/// GET /tasks/:id - Get a single task
async fn get_task(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let Path(id) = id.map_err(path_rejected)?;
    let task = state.task_service().get_task(id).await.map_err(api_error)?;
    Ok(Json(TaskResponse::from(task)))
}

/// PUT|PATCH /tasks/:id - Update the supplied fields of a task
async fn update_task(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    req: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let Path(id) = id.map_err(path_rejected)?;
    let Json(req) = req.map_err(json_rejected)?;
    let updated = state
        .task_service()
        .update_task(id, req)
        .await
        .map_err(api_error)?;

    Ok(Json(TaskResponse::from(updated)))
}

/// DELETE /tasks/:id - Delete a task
async fn delete_task(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id.map_err(path_rejected)?;
    let deleted = state
        .task_service()
        .delete_task(id)
        .await
        .map_err(api_error)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

/// POST /tasks/:id/complete - Mark a task as completed
async fn mark_completed(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let Path(id) = id.map_err(path_rejected)?;
    let task = state
        .task_service()
        .mark_completed(id)
        .await
        .map_err(api_error)?;
    Ok(Json(TaskResponse::from(task)))
}

/// POST /tasks/:id/pending - Mark a task as pending
async fn mark_pending(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let Path(id) = id.map_err(path_rejected)?;
    let task = state
        .task_service()
        .mark_pending(id)
        .await
        .map_err(api_error)?;
    Ok(Json(TaskResponse::from(task)))
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task)
                .put(update_task)
                .patch(update_task)
                .delete(delete_task),
        )
        .route("/tasks/{id}/complete", post(mark_completed))
        .route("/tasks/{id}/pending", post(mark_pending))
}
