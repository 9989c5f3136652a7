//! Environment configuration for dispatch and transcode policy.
//!
//! Both the center and the transcode worker read these values, so they
//! live here rather than in either binary. Loading goes through a lookup
//! closure so tests never have to mutate the process environment.

use std::str::FromStr;
use std::time::Duration;

use crate::device::DEFAULT_HEARTBEAT_TIMEOUT;
use crate::transcode::{DEFAULT_LEASE_TIMEOUT, DEFAULT_MAX_ATTEMPTS};

/// A running task older than this is presumed abandoned by its device.
pub const DEFAULT_TASK_STALE_AFTER: Duration = Duration::from_secs(600);

/// Stale requeues a task gets before it is failed.
pub const DEFAULT_TASK_RETRY_CEILING: i32 = 3;

/// How often the automatic stale-task sweep runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Parse a boolean-ish environment value.
///
/// `1/true/yes/y/on` are true, `0/false/no/n/off` are false (case
/// insensitive). Anything else is `None`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            expected,
        }),
    }
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs = parse_or(lookup, name, default.as_secs(), "a whole number of seconds")?;
    Ok(Duration::from_secs(secs))
}

/// Like [`secs_or`], but zero is rejected. Timeouts and sweep periods of
/// zero would reclaim live work or spin a timer.
fn positive_secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let duration = secs_or(lookup, name, default)?;
    if duration.is_zero() {
        return Err(ConfigError::Invalid {
            name,
            value: "0".into(),
            expected: "greater than zero",
        });
    }
    Ok(duration)
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_flag(&raw).map(Some).ok_or(ConfigError::Invalid {
            name,
            value: raw,
            expected: "a boolean (1/0, true/false, yes/no, on/off)",
        }),
    }
}

/// Device liveness and task reclaim policy.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub heartbeat_timeout: Duration,
    pub task_stale_after: Duration,
    pub task_retry_ceiling: i32,
    /// Whether the center requeues stale tasks on its own, in addition to
    /// the operator endpoint.
    pub auto_requeue: bool,
    pub sweep_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            task_stale_after: DEFAULT_TASK_STALE_AFTER,
            task_retry_ceiling: DEFAULT_TASK_RETRY_CEILING,
            auto_requeue: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl DispatchConfig {
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `HEARTBEAT_TIMEOUT_SECS`   | `60`    |
    /// | `TASK_STALE_SECS`          | `600`   |
    /// | `TASK_RETRY_CEILING`       | `3`     |
    /// | `TASK_AUTO_REQUEUE`        | `true`  |
    /// | `TASK_SWEEP_INTERVAL_SECS` | `60`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let task_retry_ceiling = parse_or(
            &lookup,
            "TASK_RETRY_CEILING",
            defaults.task_retry_ceiling,
            "an integer",
        )?;
        if task_retry_ceiling < 0 {
            return Err(ConfigError::Invalid {
                name: "TASK_RETRY_CEILING",
                value: task_retry_ceiling.to_string(),
                expected: "zero or more",
            });
        }
        Ok(Self {
            heartbeat_timeout: positive_secs_or(
                &lookup,
                "HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            )?,
            task_stale_after: positive_secs_or(
                &lookup,
                "TASK_STALE_SECS",
                defaults.task_stale_after,
            )?,
            task_retry_ceiling,
            auto_requeue: flag(&lookup, "TASK_AUTO_REQUEUE")?.unwrap_or(defaults.auto_requeue),
            sweep_interval: positive_secs_or(
                &lookup,
                "TASK_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval,
            )?,
        })
    }
}

/// Transcode queue and worker autostart policy.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    pub lease_timeout: Duration,
    pub max_attempts: i32,
    /// A truthy `AUTO_START_TRANSCODE_WORKER` forces autostart. Falsy and
    /// unset both leave the production/has-work policy in charge.
    pub force_autostart: bool,
    /// `APP_ENV` or `ENVIRONMENT` names a production deployment.
    pub production: bool,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            force_autostart: false,
            production: false,
        }
    }
}

impl TranscodeConfig {
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `TRANSCODE_LOCK_TIMEOUT_SECS` | `1800`  |
    /// | `TRANSCODE_MAX_ATTEMPTS`      | `3`     |
    /// | `AUTO_START_TRANSCODE_WORKER` | unset   |
    /// | `APP_ENV` / `ENVIRONMENT`     | unset   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_attempts = parse_or(
            &lookup,
            "TRANSCODE_MAX_ATTEMPTS",
            defaults.max_attempts,
            "an integer",
        )?;
        if max_attempts < 1 {
            return Err(ConfigError::Invalid {
                name: "TRANSCODE_MAX_ATTEMPTS",
                value: max_attempts.to_string(),
                expected: "at least 1",
            });
        }
        let production = ["APP_ENV", "ENVIRONMENT"]
            .iter()
            .filter_map(|name| lookup(name))
            .any(|v| is_production(&v));
        Ok(Self {
            lease_timeout: positive_secs_or(
                &lookup,
                "TRANSCODE_LOCK_TIMEOUT_SECS",
                defaults.lease_timeout,
            )?,
            max_attempts,
            force_autostart: flag(&lookup, "AUTO_START_TRANSCODE_WORKER")?.unwrap_or(false),
            production,
        })
    }
}

fn is_production(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "production" | "prod"
    )
}
