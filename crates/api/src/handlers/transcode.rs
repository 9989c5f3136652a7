//! Handlers for the `/transcode` resource: queue inspection and the
//! worker launch trigger.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use fleet_db::models::status::TranscodeStatus;
use fleet_db::models::transcode::TranscodeListQuery;
use fleet_db::repositories::TranscodeRepo;
use fleet_worker::supervisor::LaunchOutcome;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Ask the supervisor to start a worker if policy allows.
///
/// Launch problems come back as [`LaunchOutcome::Failed`]; they never fail
/// the request that queued the work.
pub async fn kick_worker(state: &AppState, has_work: bool) -> LaunchOutcome {
    let supervisor = state.supervisor.clone();
    let force = state.config.transcode.force_autostart;
    let production = state.config.transcode.production;
    tokio::task::spawn_blocking(move || supervisor.maybe_start(force, production, has_work))
        .await
        .unwrap_or_else(|e| LaunchOutcome::Failed {
            reason: format!("launcher task failed: {e}"),
        })
}

/// GET /api/v1/transcode/tasks?status=&material_id=
pub async fn list_transcode_tasks(
    State(state): State<AppState>,
    Query(params): Query<TranscodeListQuery>,
) -> AppResult<impl IntoResponse> {
    let status_id = match params.status.as_deref() {
        Some(name) => Some(
            TranscodeStatus::from_name(name)
                .ok_or_else(|| {
                    AppError::BadRequest(format!("Unknown transcode status '{name}'"))
                })?
                .id(),
        ),
        None => None,
    };
    let tasks = TranscodeRepo::list(&state.pool, status_id, &params).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/transcode/stats
pub async fn queue_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = TranscodeRepo::stats(&state.pool).await?;
    Ok(Json(DataResponse { data: stats }))
}

/// POST /api/v1/transcode/worker/start
///
/// Returns the launch outcome, e.g. `{"outcome": "launched", "pid": 4242}`
/// or `{"outcome": "no_work"}`.
pub async fn start_worker(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let has_work = state.queue.has_pending_work().await?;
    let outcome = kick_worker(&state, has_work).await;
    Ok(Json(DataResponse { data: outcome }))
}
