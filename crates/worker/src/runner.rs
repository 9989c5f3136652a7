//! Lease-execute loop of the transcode worker.
//!
//! Each cycle leases one task, runs ffmpeg on it and reports the result
//! back to the queue. A job that has started is always finished and
//! reported, even when shutdown is requested mid-run.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use fleet_core::config::ConfigError;
use fleet_core::ffmpeg::{self, ProgressEvent};
use fleet_core::transcode::{progress_percent, MediaKind};
use fleet_core::types::DbId;
use fleet_db::models::transcode::TranscodeTask;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::queue::{FailOutcome, TranscodeQueue};

/// Default pause between empty lease attempts.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(1000);

/// Progress reported as soon as a job starts, before ffmpeg says anything.
const STARTED_PROGRESS: i16 = 1;

/// Longest gap between progress writes while ffmpeg runs. Each write
/// renews the lease, so this must stay well under the lease timeout.
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime settings of the worker loop.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Relative input and output paths are resolved against this directory.
    pub media_root: PathBuf,
    pub idle_sleep: Duration,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("."),
            idle_sleep: DEFAULT_IDLE_SLEEP,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl RunnerConfig {
    /// | Env Var                     | Default   |
    /// |-----------------------------|-----------|
    /// | `MEDIA_ROOT`                | `.`       |
    /// | `TRANSCODE_WORKER_SLEEP_MS` | `1000`    |
    /// | `FFMPEG_PATH`               | `ffmpeg`  |
    /// | `FFPROBE_PATH`              | `ffprobe` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let idle_sleep = match lookup("TRANSCODE_WORKER_SLEEP_MS") {
            None => defaults.idle_sleep,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid {
                    name: "TRANSCODE_WORKER_SLEEP_MS",
                    value: raw,
                    expected: "a whole number of milliseconds",
                })?,
        };
        let path = |name: &str, default: PathBuf| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };
        Ok(Self {
            media_root: path("MEDIA_ROOT", defaults.media_root),
            idle_sleep,
            ffmpeg: path("FFMPEG_PATH", defaults.ffmpeg),
            ffprobe: path("FFPROBE_PATH", defaults.ffprobe),
        })
    }

    /// Resolve a stored media path against the media root.
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.media_root.join(path)
        }
    }
}

/// Why a single transcode attempt failed. The display text is what gets
/// recorded on the task.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("input file not found: {0}")]
    InputMissing(PathBuf),

    #[error("unknown media kind '{0}'")]
    UnknownKind(String),

    #[error("failed to start ffmpeg: {0}")]
    Spawn(std::io::Error),

    #[error("ffmpeg exited with code {exit_code:?}: {stderr}")]
    Ffmpeg {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Worker loop bound to one queue and one lease identity.
pub struct TranscodeRunner {
    queue: TranscodeQueue,
    worker_id: String,
    config: RunnerConfig,
}

impl TranscodeRunner {
    pub fn new(queue: TranscodeQueue, worker_id: String, config: RunnerConfig) -> Self {
        Self {
            queue,
            worker_id,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until `cancel` fires. Cancellation is only observed between
    /// jobs.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_id = %self.worker_id,
            media_root = %self.config.media_root.display(),
            idle_sleep_ms = self.config.idle_sleep.as_millis() as u64,
            "Transcode worker started",
        );

        while !cancel.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(worked) => !worked,
                Err(e) => {
                    tracing::error!(error = %e, "Transcode cycle failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.idle_sleep) => {}
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "Transcode worker stopping");
    }

    /// Lease and process at most one task. Returns whether a task was
    /// processed.
    pub async fn run_once(&self) -> Result<bool, sqlx::Error> {
        let Some(task) = self.queue.lease(&self.worker_id).await? else {
            return Ok(false);
        };

        match self.execute(&task).await {
            Ok(()) => {
                self.queue
                    .complete(task.id, &self.worker_id, &task.output_path)
                    .await?;
            }
            Err(e) => {
                let outcome = self
                    .queue
                    .fail(task.id, &self.worker_id, &e.to_string())
                    .await?;
                if outcome == FailOutcome::LeaseLost {
                    tracing::warn!(
                        transcode_task_id = task.id,
                        "Lease expired while transcoding, result dropped",
                    );
                }
            }
        }
        Ok(true)
    }

    async fn execute(&self, task: &TranscodeTask) -> Result<(), TranscodeError> {
        let kind: MediaKind = task
            .kind
            .parse()
            .map_err(|_| TranscodeError::UnknownKind(task.kind.clone()))?;
        let input = self.config.resolve(&task.input_path);
        let output = self.config.resolve(&task.output_path);

        if !input.exists() {
            return Err(TranscodeError::InputMissing(input));
        }

        // Without a duration ffmpeg still runs; only the percentage is lost.
        let duration_secs = match ffmpeg::probe_media(&self.config.ffprobe, &input).await {
            Ok(probe) => ffmpeg::parse_duration(&probe),
            Err(e) => {
                tracing::warn!(
                    transcode_task_id = task.id,
                    error = %e,
                    "Probe failed, transcoding without progress",
                );
                0.0
            }
        };

        self.report_progress(task.id, STARTED_PROGRESS).await;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::debug!(
            transcode_task_id = task.id,
            input = %input.display(),
            output = %output.display(),
            duration_secs,
            "Running ffmpeg",
        );

        let mut child = tokio::process::Command::new(&self.config.ffmpeg)
            .args(ffmpeg::transcode_args(kind, &input, &output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TranscodeError::Spawn)?;

        // Drain stderr concurrently so a chatty ffmpeg cannot block on a
        // full pipe while we read progress from stdout.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut last_reported = STARTED_PROGRESS;
            let mut last_write = Instant::now();
            while let Some(line) = lines.next_line().await? {
                let Some(ProgressEvent::OutTime(out_time_us)) = ffmpeg::parse_progress_line(&line)
                else {
                    continue;
                };
                let pct = progress_percent(out_time_us, duration_secs)
                    .filter(|pct| *pct > last_reported)
                    .unwrap_or(last_reported);
                if pct > last_reported || last_write.elapsed() >= LEASE_RENEW_INTERVAL {
                    last_reported = pct;
                    last_write = Instant::now();
                    self.report_progress(task.id, pct).await;
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            Ok(())
        } else {
            Err(TranscodeError::Ffmpeg {
                exit_code: status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }

    async fn report_progress(&self, task_id: DbId, pct: i16) {
        match self
            .queue
            .update_progress(task_id, &self.worker_id, pct)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(transcode_task_id = task_id, "Progress ignored: lease not held");
            }
            Err(e) => {
                tracing::warn!(transcode_task_id = task_id, error = %e, "Progress update failed");
            }
        }
    }
}
