//! Handlers for the `/materials` resource.
//!
//! Creating a material probes the source file and, unless it is already
//! playable everywhere, queues a transcode and nudges the worker
//! supervisor.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use fleet_core::error::CoreError;
use fleet_core::ffmpeg::{self, MediaSummary};
use fleet_core::types::DbId;
use fleet_db::models::material::{CreateMaterial, Material, MaterialListQuery, NewMaterial};
use fleet_db::models::status::MaterialStatus;
use fleet_db::models::transcode::TranscodeTask;
use fleet_db::repositories::MaterialRepo;
use fleet_worker::supervisor::LaunchOutcome;
use serde::Serialize;

use super::transcode::kick_worker;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// A material plus the transcode queued for it, if any.
#[derive(Debug, Serialize)]
pub struct MaterialWithTranscode {
    pub material: Material,
    pub transcode_task: Option<TranscodeTask>,
    /// What the worker supervisor did about the new work.
    pub worker: Option<LaunchOutcome>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_material(state: &AppState, id: DbId) -> AppResult<Material> {
    MaterialRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Material",
            id,
        }))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/materials
///
/// `transcode: true|false` forces the decision; otherwise the source is
/// probed and only transcoded when devices cannot play it as is. A source
/// that cannot be probed is queued anyway, so the failure is recorded on
/// the transcode task.
pub async fn create_material(
    State(state): State<AppState>,
    Json(input): Json<CreateMaterial>,
) -> AppResult<impl IntoResponse> {
    if input.name.trim().is_empty() {
        return Err(CoreError::Validation("name must not be blank".into()).into());
    }
    if input.original_path.trim().is_empty() {
        return Err(CoreError::Validation("original_path must not be blank".into()).into());
    }

    let source = state.config.media_path(&input.original_path);
    let probe = match ffmpeg::probe_media(&state.config.ffprobe, &source).await {
        Ok(probe) => Some(probe),
        Err(e) => {
            tracing::warn!(path = %source.display(), error = %e, "Could not probe material");
            None
        }
    };
    let summary = probe.as_ref().map(MediaSummary::from_probe);

    let transcode = input.transcode.unwrap_or_else(|| {
        probe
            .as_ref()
            .map_or(true, |p| ffmpeg::needs_transcode(input.kind, p))
    });

    let new = NewMaterial {
        name: input.name.trim().to_string(),
        kind: input.kind,
        status: if transcode {
            MaterialStatus::Processing
        } else {
            MaterialStatus::Ready
        },
        original_path: input.original_path.clone(),
        path: (!transcode).then(|| input.original_path.clone()),
        meta_json: summary
            .as_ref()
            .and_then(|s| serde_json::to_value(s).ok()),
        duration_secs: summary
            .as_ref()
            .map(|s| s.duration_secs)
            .filter(|d| *d > 0.0),
        width: summary.as_ref().and_then(|s| s.width),
        height: summary.as_ref().and_then(|s| s.height),
        size_bytes: summary.as_ref().and_then(|s| s.size_bytes),
    };
    let (material, transcode_task, worker) = if transcode {
        let (material, task) = state.queue.enqueue_new_material(&new).await?;
        (material, Some(task), Some(kick_worker(&state, true).await))
    } else {
        (MaterialRepo::create(&state.pool, &new).await?, None, None)
    };

    tracing::info!(
        material_id = material.id,
        kind = %input.kind,
        transcode,
        "Material created",
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: MaterialWithTranscode {
                material,
                transcode_task,
                worker,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/materials
pub async fn list_materials(
    State(state): State<AppState>,
    Query(params): Query<MaterialListQuery>,
) -> AppResult<impl IntoResponse> {
    let status_id = match params.status.as_deref() {
        Some(name) => Some(
            MaterialStatus::from_name(name)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown material status '{name}'")))?
                .id(),
        ),
        None => None,
    };
    let materials = MaterialRepo::list(&state.pool, status_id, &params).await?;
    Ok(Json(DataResponse { data: materials }))
}

/// GET /api/v1/materials/{id}
pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let material = find_material(&state, id).await?;
    Ok(Json(DataResponse { data: material }))
}

// ---------------------------------------------------------------------------
// Re-transcode
// ---------------------------------------------------------------------------

/// POST /api/v1/materials/{id}/transcode
///
/// Queue a new transcode with a fresh attempt budget. 409 while one is
/// still pending or running.
pub async fn retranscode_material(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let (material, task) = state
        .queue
        .retranscode(id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Material",
            id,
        })?;
    let worker = kick_worker(&state, true).await;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: MaterialWithTranscode {
                material,
                transcode_task: Some(task),
                worker: Some(worker),
            },
        }),
    ))
}
