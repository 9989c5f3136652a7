//! Automation task entity and DTOs.

use fleet_core::task::TaskPayload;
use fleet_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::StatusId;

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub kind: String,
    pub account_id: DbId,
    /// Kind-tagged body; deserializes into [`TaskPayload`].
    pub payload: serde_json::Value,
    pub status_id: StatusId,
    pub progress: i16,
    pub error_message: Option<String>,
    pub retry_count: i32,
    /// External id of the device that claimed the task.
    pub claimed_by: Option<String>,
    /// Identifies the current claim; cleared on requeue.
    pub claim_token: Option<Uuid>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/tasks`.
///
/// The payload is flattened, so a chat task is posted as
/// `{"account_id": 1, "kind": "chat", "target_user": "...", "message": "..."}`.
#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub account_id: DbId,
    #[serde(flatten)]
    pub payload: TaskPayload,
}

/// Query parameters for `GET /api/v1/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// Status name, e.g. `pending`.
    pub status: Option<String>,
    /// Task kind, e.g. `video`.
    pub kind: Option<String>,
    pub account_id: Option<DbId>,
    /// External device id.
    pub device_id: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Per-status task counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Result of a stale-claim sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StaleSweep {
    /// Tasks returned to `pending` with their retry counter bumped.
    pub requeued: Vec<DbId>,
    /// Tasks that had exhausted the retry ceiling and were failed.
    pub failed: Vec<DbId>,
}
