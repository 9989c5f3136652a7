//! Transcode queue entries.

use fleet_core::transcode::MediaKind;
use fleet_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `transcode_tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TranscodeTask {
    pub id: DbId,
    pub material_id: DbId,
    pub input_path: String,
    pub output_path: String,
    pub kind: String,
    pub status_id: StatusId,
    pub progress: i16,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    /// Worker identity (`hostname:pid`) holding the lease.
    pub locked_by: Option<String>,
    pub locked_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Parameters for a new queue entry.
#[derive(Debug, Clone)]
pub struct EnqueueTranscode {
    pub material_id: DbId,
    pub input_path: String,
    pub output_path: String,
    pub kind: MediaKind,
    pub max_attempts: i32,
}

/// Query parameters for `GET /api/v1/transcode/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TranscodeListQuery {
    pub status: Option<String>,
    pub material_id: Option<DbId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Per-status queue counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
}
