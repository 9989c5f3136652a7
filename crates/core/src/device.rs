//! Device liveness and identifier rules.
//!
//! A device has no stored online flag. Its status is recomputed from the
//! last heartbeat every time it is read, so there is no per-device timer.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Default heartbeat timeout. Agents heartbeat every 30 seconds, so a
/// device is considered gone after two missed beats.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum length of an external device identifier.
pub const MAX_DEVICE_ID_LEN: usize = 128;

static DEVICE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:\-]+$").expect("valid regex"));

/// Derived device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// A device is online iff `now - last_heartbeat < timeout`.
///
/// A heartbeat stamped in the future (clock skew between hosts) counts as
/// online.
pub fn is_online(last_heartbeat: Timestamp, now: Timestamp, timeout: Duration) -> bool {
    let age = now.signed_duration_since(last_heartbeat);
    match age.to_std() {
        Ok(age) => age < timeout,
        Err(_) => true,
    }
}

/// Status of a device whose last heartbeat was `last_heartbeat`.
pub fn status_at(last_heartbeat: Timestamp, now: Timestamp, timeout: Duration) -> DeviceStatus {
    if is_online(last_heartbeat, now, timeout) {
        DeviceStatus::Online
    } else {
        DeviceStatus::Offline
    }
}

/// Validate an external device identifier.
///
/// Identifiers are chosen by agents, so they are restricted to characters
/// that are safe in URLs and file names.
pub fn validate_device_id(device_id: &str) -> Result<(), CoreError> {
    if device_id.is_empty() {
        return Err(CoreError::Validation("device_id must not be empty".into()));
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(CoreError::Validation(format!(
            "device_id must be at most {MAX_DEVICE_ID_LEN} characters"
        )));
    }
    if !DEVICE_ID_RE.is_match(device_id) {
        return Err(CoreError::Validation(
            "device_id may only contain letters, digits, '.', '_', ':' and '-'".into(),
        ));
    }
    Ok(())
}
