//! Agent configuration.

use std::path::PathBuf;
use std::time::Duration;

use fleet_core::config::ConfigError;

/// Agents heartbeat twice per default liveness window.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a single automation run.
pub const DEFAULT_EXECUTOR_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the center, e.g. `http://center:3000`.
    pub center_url: String,
    /// Fixed device id. When unset one is generated and kept in `id_file`.
    pub device_id: Option<String>,
    pub id_file: PathBuf,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    /// Program run for each claimed task. `None` means tasks are reported
    /// failed without running anything.
    pub executor_command: Option<String>,
    pub executor_args: Vec<String>,
    pub executor_timeout: Duration,
}

impl AgentConfig {
    /// | Env Var                   | Required | Default      |
    /// |---------------------------|----------|--------------|
    /// | `CENTER_URL`              | yes      | --           |
    /// | `DEVICE_ID`               | no       | generated    |
    /// | `DEVICE_ID_FILE`          | no       | `.device_id` |
    /// | `DEVICE_NAME`             | no       | --           |
    /// | `DEVICE_IP`               | no       | --           |
    /// | `HEARTBEAT_INTERVAL_SECS` | no       | `30`         |
    /// | `POLL_INTERVAL_SECS`      | no       | `10`         |
    /// | `EXECUTOR_COMMAND`        | no       | --           |
    /// | `EXECUTOR_ARGS`           | no       | --           |
    /// | `EXECUTOR_TIMEOUT_SECS`   | no       | `600`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let center_url = non_empty("CENTER_URL").ok_or(ConfigError::Invalid {
            name: "CENTER_URL",
            value: String::new(),
            expected: "the center's base URL",
        })?;
        let secs = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match non_empty(name) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                    _ => Err(ConfigError::Invalid {
                        name,
                        value: raw,
                        expected: "a positive whole number of seconds",
                    }),
                },
            }
        };

        Ok(Self {
            center_url: center_url.trim().trim_end_matches('/').to_string(),
            device_id: non_empty("DEVICE_ID").map(|v| v.trim().to_string()),
            id_file: non_empty("DEVICE_ID_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".device_id")),
            device_name: non_empty("DEVICE_NAME"),
            ip_address: non_empty("DEVICE_IP"),
            heartbeat_interval: secs("HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_INTERVAL)?,
            poll_interval: secs("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL)?,
            executor_command: non_empty("EXECUTOR_COMMAND"),
            executor_args: lookup("EXECUTOR_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            executor_timeout: secs("EXECUTOR_TIMEOUT_SECS", DEFAULT_EXECUTOR_TIMEOUT)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn center_url_is_required() {
        assert!(AgentConfig::from_lookup(env(&[])).is_err());
        assert!(AgentConfig::from_lookup(env(&[("CENTER_URL", "  ")])).is_err());
    }

    #[test]
    fn defaults_apply() {
        let config = AgentConfig::from_lookup(env(&[("CENTER_URL", "http://center:3000/")])).unwrap();
        assert_eq!(config.center_url, "http://center:3000");
        assert_eq!(config.device_id, None);
        assert_eq!(config.id_file, PathBuf::from(".device_id"));
        assert_eq!(config.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(config.executor_command.is_none());
        assert!(config.executor_args.is_empty());
    }

    #[test]
    fn executor_args_split_on_whitespace() {
        let config = AgentConfig::from_lookup(env(&[
            ("CENTER_URL", "http://c"),
            ("EXECUTOR_COMMAND", "python3"),
            ("EXECUTOR_ARGS", "run.py  --headless"),
            ("POLL_INTERVAL_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.executor_command.as_deref(), Some("python3"));
        assert_eq!(config.executor_args, ["run.py", "--headless"]);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = AgentConfig::from_lookup(env(&[
            ("CENTER_URL", "http://c"),
            ("HEARTBEAT_INTERVAL_SECS", "0"),
        ]));
        assert!(err.is_err());
    }
}
