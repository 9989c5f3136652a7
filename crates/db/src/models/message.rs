//! Append-only chat message log.

use fleet_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `messages` table. Never updated after insert.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: DbId,
    pub account_id: DbId,
    /// User name of the other party.
    pub peer: String,
    pub body: String,
    /// Sent by the account rather than received.
    pub is_me: bool,
    /// Display time as shown by the platform, kept verbatim.
    pub message_time: Option<String>,
    pub sent_at: Timestamp,
    pub created_at: Timestamp,
}

/// DTO for `POST /api/v1/messages`.
#[derive(Debug, Deserialize)]
pub struct CreateMessage {
    pub account_id: DbId,
    pub peer: String,
    pub body: String,
    #[serde(default)]
    pub is_me: bool,
    pub message_time: Option<String>,
    /// Defaults to the insert time.
    pub sent_at: Option<Timestamp>,
}

/// Query parameters for `GET /api/v1/messages`.
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub account_id: DbId,
    pub peer: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
