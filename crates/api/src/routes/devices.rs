//! Route definitions for the `/devices` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::devices;
use crate::state::AppState;

/// Routes mounted at `/devices`.
///
/// ```text
/// GET    /                          -> list_devices
/// POST   /register                  -> register_device
/// GET    /stats                     -> fleet_stats
/// GET    /{device_id}               -> get_device
/// POST   /{device_id}/heartbeat     -> heartbeat
/// GET    /{device_id}/tasks/next    -> claim_next_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(devices::list_devices))
        .route("/register", post(devices::register_device))
        .route("/stats", get(devices::fleet_stats))
        .route("/{device_id}", get(devices::get_device))
        .route("/{device_id}/heartbeat", post(devices::heartbeat))
        .route("/{device_id}/tasks/next", get(devices::claim_next_task))
}
