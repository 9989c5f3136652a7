//! Route definitions for the `/tasks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /                  -> list_tasks
/// POST   /                  -> create_task
/// GET    /stats             -> task_stats
/// POST   /requeue-stale     -> requeue_stale
/// GET    /{id}              -> get_task
/// POST   /{id}/report       -> report_task
/// POST   /{id}/progress     -> report_progress
/// POST   /{id}/requeue      -> requeue_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route("/stats", get(tasks::task_stats))
        .route("/requeue-stale", post(tasks::requeue_stale))
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/report", post(tasks::report_task))
        .route("/{id}/progress", post(tasks::report_progress))
        .route("/{id}/requeue", post(tasks::requeue_task))
}
