use axum::routing::{get, post};
use axum::Router;

use crate::handlers::transcode;
use crate::state::AppState;

/// Routes mounted at `/transcode`.
///
/// ```text
/// GET    /tasks           -> list_transcode_tasks
/// GET    /stats           -> queue_stats
/// POST   /worker/start    -> start_worker
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(transcode::list_transcode_tasks))
        .route("/stats", get(transcode::queue_stats))
        .route("/worker/start", post(transcode::start_worker))
}
