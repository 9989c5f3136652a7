pub mod accounts;
pub mod devices;
pub mod health;
pub mod materials;
pub mod messages;
pub mod tasks;
pub mod transcode;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /devices/register                    register or update (POST)
/// /devices                             list with derived status
/// /devices/stats                       online/offline counts
/// /devices/{device_id}                 get
/// /devices/{device_id}/heartbeat       heartbeat (POST, auto-registers)
/// /devices/{device_id}/tasks/next      claim next task (GET)
///
/// /accounts                            list (?device_id=), create
/// /accounts/{id}                       get
/// /accounts/{id}/login-status          login flow update (PUT)
///
/// /tasks                               list, create
/// /tasks/stats                         counts per status
/// /tasks/requeue-stale                 stale sweep now (POST)
/// /tasks/{id}                          get
/// /tasks/{id}/report                   terminal report from device (POST)
/// /tasks/{id}/progress                 progress from device (POST)
/// /tasks/{id}/requeue                  operator requeue (POST)
///
/// /messages                            list (?account_id=&peer=), append
///
/// /materials                           list, create
/// /materials/{id}                      get
/// /materials/{id}/transcode            queue a fresh transcode (POST)
///
/// /transcode/tasks                     queue entries (?status=)
/// /transcode/stats                     counts per status
/// /transcode/worker/start              launch worker if allowed (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/devices", devices::router())
        .nest("/accounts", accounts::router())
        .nest("/tasks", tasks::router())
        .nest("/messages", messages::router())
        .nest("/materials", materials::router())
        .nest("/transcode", transcode::router())
}
