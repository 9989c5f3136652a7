//! Platform account entity and DTOs.

use fleet_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// Platform used when an account is created without one.
pub const DEFAULT_PLATFORM: &str = "douyin";

/// A row from the `accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: DbId,
    /// Owning device (`devices.id`).
    pub device_id: DbId,
    pub account_name: String,
    pub platform: String,
    /// Stored session credentials. Never sent back over the API.
    #[serde(skip_serializing)]
    pub cookies: Option<String>,
    pub login_status_id: StatusId,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/accounts`.
#[derive(Debug, Deserialize)]
pub struct CreateAccount {
    /// External id of the owning device.
    pub device_id: String,
    pub account_name: String,
    pub platform: Option<String>,
    pub cookies: Option<String>,
}

/// DTO for `PUT /api/v1/accounts/{id}/login-status`.
#[derive(Debug, Deserialize)]
pub struct UpdateLoginStatus {
    /// One of `logged_out`, `logging_in`, `logged_in`, `expired`.
    pub login_status: String,
    /// Fresh session credentials captured by a successful login.
    pub cookies: Option<String>,
}

/// Query parameters for `GET /api/v1/accounts`.
#[derive(Debug, Deserialize)]
pub struct AccountListQuery {
    /// Filter by external device id.
    pub device_id: Option<String>,
}
