//! Handlers for the `/devices` resource.
//!
//! These are the endpoints agents call: registration, heartbeat and the
//! claim poll. Listing and stats are for operators.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use fleet_db::models::device::{Heartbeat, RegisterDevice};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Registration & heartbeat
// ---------------------------------------------------------------------------

/// POST /api/v1/devices/register
///
/// Idempotent upsert keyed by `device_id`. Returns the device with its
/// derived status.
pub async fn register_device(
    State(state): State<AppState>,
    Json(input): Json<RegisterDevice>,
) -> AppResult<impl IntoResponse> {
    let device = state
        .registry
        .register_or_update(
            &input.device_id,
            input.device_name.as_deref(),
            input.ip_address.as_deref(),
        )
        .await?;

    tracing::info!(
        device_id = %device.device.device_id,
        device_name = %device.device.device_name,
        "Device registered",
    );

    Ok(Json(DataResponse { data: device }))
}

/// POST /api/v1/devices/{device_id}/heartbeat
///
/// Body is optional; `device_name` / `ip_address` are updated when present.
/// Unknown devices are registered.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Option<Json<Heartbeat>>,
) -> AppResult<impl IntoResponse> {
    let Json(beat) = body.unwrap_or_default();
    let device = state
        .registry
        .heartbeat(
            &device_id,
            beat.device_name.as_deref(),
            beat.ip_address.as_deref(),
        )
        .await?;
    Ok(Json(DataResponse { data: device }))
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// GET /api/v1/devices/{device_id}/tasks/next
///
/// Claim the oldest eligible pending task. `data` is `null` when there is
/// nothing to do.
pub async fn claim_next_task(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task = state.dispatcher.claim_next(&device_id).await?;
    Ok(Json(DataResponse { data: task }))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/devices
pub async fn list_devices(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let devices = state.registry.list().await?;
    Ok(Json(DataResponse { data: devices }))
}

/// GET /api/v1/devices/stats
pub async fn fleet_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = state.registry.stats().await?;
    Ok(Json(DataResponse { data: stats }))
}

/// GET /api/v1/devices/{device_id}
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let device = state
        .registry
        .get(&device_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))?;
    Ok(Json(DataResponse { data: device }))
}
