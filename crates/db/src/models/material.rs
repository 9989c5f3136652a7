//! Media material entity and DTOs.

use fleet_core::transcode::MediaKind;
use fleet_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::MaterialStatus;
use super::status::StatusId;

/// A row from the `materials` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Material {
    pub id: DbId,
    pub name: String,
    pub kind: String,
    pub status_id: StatusId,
    pub original_path: String,
    /// Current playable output. `None` until the first transcode finishes.
    pub path: Option<String>,
    pub meta_json: Option<serde_json::Value>,
    pub duration_secs: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub size_bytes: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/materials`.
#[derive(Debug, Deserialize)]
pub struct CreateMaterial {
    pub name: String,
    pub kind: MediaKind,
    /// Source file, relative to the media root.
    pub original_path: String,
    /// Force (`true`) or skip (`false`) transcoding. When absent the
    /// source is probed and transcoded only if devices cannot play it.
    pub transcode: Option<bool>,
}

/// Insert parameters assembled by the API after probing.
#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub name: String,
    pub kind: MediaKind,
    pub status: MaterialStatus,
    pub original_path: String,
    pub path: Option<String>,
    pub meta_json: Option<serde_json::Value>,
    pub duration_secs: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub size_bytes: Option<i64>,
}

/// Query parameters for `GET /api/v1/materials`.
#[derive(Debug, Default, Deserialize)]
pub struct MaterialListQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
