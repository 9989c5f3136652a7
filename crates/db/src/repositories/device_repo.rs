//! Repository for the `devices` table.

use std::time::Duration;

use fleet_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::device::{Device, FleetStats};

/// Column list for `devices` queries.
const COLUMNS: &str = "\
    id, device_id, device_name, ip_address, last_heartbeat_at, \
    created_at, updated_at";

/// Provides registration, heartbeat and lookup for devices.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Register a device or refresh an existing one, stamping a heartbeat.
    ///
    /// Keyed by the external `device_id`. `None` for name or address keeps
    /// the stored value, so a bare heartbeat never blanks them.
    pub async fn upsert_heartbeat(
        pool: &PgPool,
        device_id: &str,
        device_name: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<Device, sqlx::Error> {
        let query = format!(
            "INSERT INTO devices (device_id, device_name, ip_address, last_heartbeat_at) \
             VALUES ($1, COALESCE($2, ''), $3, NOW()) \
             ON CONFLICT (device_id) DO UPDATE SET \
                 device_name = COALESCE($2, devices.device_name), \
                 ip_address = COALESCE($3, devices.ip_address), \
                 last_heartbeat_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Device>(&query)
            .bind(device_id)
            .bind(device_name)
            .bind(ip_address)
            .fetch_one(pool)
            .await
    }

    /// Find a device by its external identifier.
    pub async fn find_by_device_id(
        pool: &PgPool,
        device_id: &str,
    ) -> Result<Option<Device>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices WHERE device_id = $1");
        sqlx::query_as::<_, Device>(&query)
            .bind(device_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a device by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Device>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices WHERE id = $1");
        sqlx::query_as::<_, Device>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all devices ordered by external identifier.
    pub async fn list(pool: &PgPool) -> Result<Vec<Device>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices ORDER BY device_id");
        sqlx::query_as::<_, Device>(&query).fetch_all(pool).await
    }

    /// The database clock. Liveness is always judged against it, the same
    /// clock that stamps heartbeats and gates claims.
    pub async fn db_now(pool: &PgPool) -> Result<Timestamp, sqlx::Error> {
        sqlx::query_scalar("SELECT NOW()").fetch_one(pool).await
    }

    /// Count devices whose last heartbeat falls inside `heartbeat_timeout`.
    pub async fn fleet_stats(
        pool: &PgPool,
        heartbeat_timeout: Duration,
    ) -> Result<FleetStats, sqlx::Error> {
        let (total, online): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER ( \
                        WHERE last_heartbeat_at > NOW() - make_interval(secs => $1) \
                    ) \
             FROM devices",
        )
        .bind(heartbeat_timeout.as_secs_f64())
        .fetch_one(pool)
        .await?;
        Ok(FleetStats {
            total,
            online,
            offline: total - online,
        })
    }
}
