use std::path::PathBuf;

use fleet_core::config::{DispatchConfig, TranscodeConfig};
use fleet_worker::supervisor::SupervisorConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Device liveness and task requeue policy.
    pub dispatch: DispatchConfig,
    /// Transcode lease, attempt budget and worker autostart policy.
    pub transcode: TranscodeConfig,
    /// Material paths are relative to this directory (default: `.`).
    pub media_root: PathBuf,
    /// `ffprobe` binary used to inspect new materials.
    pub ffprobe: PathBuf,
    /// Where the transcode worker's lock, PID and log files live.
    pub supervisor: SupervisorConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `MEDIA_ROOT`           | `.`                        |
    /// | `FFPROBE_PATH`         | `ffprobe`                  |
    ///
    /// Dispatch, transcode and supervisor settings are documented on
    /// [`DispatchConfig`], [`TranscodeConfig`] and [`SupervisorConfig`].
    /// Invalid values panic, so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let dispatch = DispatchConfig::from_env().unwrap_or_else(|e| panic!("{e}"));
        let transcode = TranscodeConfig::from_env().unwrap_or_else(|e| panic!("{e}"));

        let media_root = std::env::var_os("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let ffprobe = std::env::var_os("FFPROBE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffprobe"));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            dispatch,
            transcode,
            media_root,
            ffprobe,
            supervisor: SupervisorConfig::from_env(),
        }
    }

    /// Resolve a stored media path against [`media_root`](Self::media_root).
    pub fn media_path(&self, stored: &str) -> PathBuf {
        let path = std::path::Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.media_root.join(path)
        }
    }
}
