//! Device registry.

use std::time::Duration;

use fleet_core::device::validate_device_id;
use fleet_db::models::device::{DeviceView, FleetStats};
use fleet_db::repositories::DeviceRepo;
use sqlx::PgPool;

use super::EngineError;

/// Registers devices and reports their derived online status.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    pool: PgPool,
    heartbeat_timeout: Duration,
}

impl DeviceRegistry {
    pub fn new(pool: PgPool, heartbeat_timeout: Duration) -> Self {
        Self {
            pool,
            heartbeat_timeout,
        }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Idempotent registration keyed by the external device id. Stamps the
    /// heartbeat, so a freshly registered device is online.
    pub async fn register_or_update(
        &self,
        device_id: &str,
        device_name: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<DeviceView, EngineError> {
        validate_device_id(device_id)?;
        let device =
            DeviceRepo::upsert_heartbeat(&self.pool, device_id, device_name, ip_address).await?;
        // Just stamped with the database's NOW(), so online by construction.
        let stamped_at = device.last_heartbeat_at;
        Ok(DeviceView::at(device, stamped_at, self.heartbeat_timeout))
    }

    /// Record a heartbeat. An unknown device is registered on the spot,
    /// since agents may beat before their registration call lands.
    pub async fn heartbeat(
        &self,
        device_id: &str,
        device_name: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<DeviceView, EngineError> {
        let view = self
            .register_or_update(device_id, device_name, ip_address)
            .await?;
        tracing::debug!(device_id, "Heartbeat");
        Ok(view)
    }

    /// Status is computed against the database clock, matching
    /// [`stats`](Self::stats) and the claim gate.
    pub async fn get(&self, device_id: &str) -> Result<Option<DeviceView>, sqlx::Error> {
        let now = DeviceRepo::db_now(&self.pool).await?;
        Ok(DeviceRepo::find_by_device_id(&self.pool, device_id)
            .await?
            .map(|d| DeviceView::at(d, now, self.heartbeat_timeout)))
    }

    pub async fn list(&self) -> Result<Vec<DeviceView>, sqlx::Error> {
        let now = DeviceRepo::db_now(&self.pool).await?;
        Ok(DeviceRepo::list(&self.pool)
            .await?
            .into_iter()
            .map(|d| DeviceView::at(d, now, self.heartbeat_timeout))
            .collect())
    }

    pub async fn stats(&self) -> Result<FleetStats, sqlx::Error> {
        DeviceRepo::fleet_stats(&self.pool, self.heartbeat_timeout).await
    }
}
