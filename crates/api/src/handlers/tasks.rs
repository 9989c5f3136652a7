//! Handlers for the `/tasks` resource.
//!
//! Task creation and inspection are operator endpoints; `report` and
//! `progress` are called by the device that claimed the task.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use fleet_core::error::CoreError;
use fleet_core::task::{ProgressReport, TaskKind, TaskReport};
use fleet_core::types::DbId;
use fleet_db::models::status::TaskStatus;
use fleet_db::models::task::{CreateTask, TaskListQuery};
use fleet_db::repositories::TaskRepo;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /tasks/{id}/progress` responses.
#[derive(Debug, Serialize)]
pub struct ProgressApplied {
    pub applied: bool,
}

// ---------------------------------------------------------------------------
// Create & read
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks
///
/// Body is the account id plus a kind-tagged payload, e.g.
/// `{"account_id": 1, "kind": "chat", "target_user": "...", "message": "..."}`.
pub async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<CreateTask>,
) -> AppResult<impl IntoResponse> {
    let task = state
        .dispatcher
        .create(input.account_id, &input.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

/// GET /api/v1/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let status_id = match params.status.as_deref() {
        Some(name) => Some(
            TaskStatus::from_name(name)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown task status '{name}'")))?
                .id(),
        ),
        None => None,
    };
    if let Some(kind) = params.kind.as_deref() {
        kind.parse::<TaskKind>()?;
    }
    let tasks = TaskRepo::list(&state.pool, status_id, &params).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/tasks/stats
pub async fn task_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = TaskRepo::stats(&state.pool).await?;
    Ok(Json(DataResponse { data: stats }))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = TaskRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound { entity: "Task", id })?;
    Ok(Json(DataResponse { data: task }))
}

// ---------------------------------------------------------------------------
// Device reports
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks/{id}/report
///
/// Always 200: a report for a task that is no longer running for the
/// reporting device comes back as `{"outcome": "ignored"}` so agents do not
/// retry it.
pub async fn report_task(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(report): Json<TaskReport>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.dispatcher.report(id, &report).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/tasks/{id}/progress
pub async fn report_progress(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(report): Json<ProgressReport>,
) -> AppResult<impl IntoResponse> {
    let applied = state
        .dispatcher
        .report_progress(id, &report)
        .await?;
    Ok(Json(DataResponse {
        data: ProgressApplied { applied },
    }))
}

// ---------------------------------------------------------------------------
// Operator recovery
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks/{id}/requeue
///
/// 409 when the task is not running.
pub async fn requeue_task(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = state.dispatcher.requeue(id).await?;
    match task {
        Some(task) => Ok(Json(DataResponse { data: task })),
        None => {
            TaskRepo::find_by_id(&state.pool, id)
                .await?
                .ok_or(CoreError::NotFound { entity: "Task", id })?;
            Err(CoreError::Conflict("Only running tasks can be requeued".into()).into())
        }
    }
}

/// POST /api/v1/tasks/requeue-stale
///
/// Run the stale sweep now instead of waiting for the reaper.
pub async fn requeue_stale(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let sweep = state.dispatcher.requeue_stale().await?;
    Ok(Json(DataResponse { data: sweep }))
}
