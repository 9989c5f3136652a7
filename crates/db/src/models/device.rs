//! Device entity, registration DTOs and the derived status view.

use std::time::Duration;

use fleet_core::device::{status_at, DeviceStatus};
use fleet_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `devices` table.
///
/// Liveness is not stored; see [`DeviceView`].
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub id: DbId,
    pub device_id: String,
    pub device_name: String,
    pub ip_address: Option<String>,
    pub last_heartbeat_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/devices/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterDevice {
    pub device_id: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
}

/// Optional body of `POST /api/v1/devices/{device_id}/heartbeat`.
#[derive(Debug, Default, Deserialize)]
pub struct Heartbeat {
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
}

/// A device together with its status as of the moment it was read.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Device,
    pub status: DeviceStatus,
}

impl DeviceView {
    pub fn at(device: Device, now: Timestamp, heartbeat_timeout: Duration) -> Self {
        let status = status_at(device.last_heartbeat_at, now, heartbeat_timeout);
        Self { device, status }
    }
}

/// Fleet-wide online/offline counts.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStats {
    pub total: i64,
    pub online: i64,
    pub offline: i64,
}
