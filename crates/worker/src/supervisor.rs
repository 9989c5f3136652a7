//! Singleton guard for the transcode worker process.
//!
//! Two files under the state directory coordinate launches:
//!
//! - `worker_transcode.lock` is held with a non-blocking exclusive `flock`
//!   only while deciding whether to launch. The OS drops it if the holder
//!   dies.
//! - `worker_transcode.pid` records the launched worker; a launch is
//!   declined while that process is alive.
//!
//! Worker output is appended to `worker_transcode.log`. All file work is
//! blocking, so async callers go through `spawn_blocking`.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;

/// Lock file guarding the launch decision.
pub const LOCK_FILE: &str = "worker_transcode.lock";

/// PID of the most recently launched worker.
pub const PID_FILE: &str = "worker_transcode.pid";

/// Worker stdout/stderr.
pub const LOG_FILE: &str = "worker_transcode.log";

/// Set to `1` in the environment of workers launched by the supervisor.
pub const AUTOSTARTED_ENV: &str = "TRANSCODE_WORKER_AUTOSTARTED";

/// Result of a launch request. Never an error: a worker that could not be
/// started is reported, logged, and left for the next request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LaunchOutcome {
    Launched { pid: u32 },
    AlreadyRunning { pid: u32 },
    /// Another launcher holds the lock right now.
    LockBusy,
    /// Autostart is switched off here (explicitly, or by production mode).
    Disabled,
    /// Nothing is queued, so no worker is needed.
    NoWork,
    Failed { reason: String },
}

/// Whether an automatic start may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutostartDecision {
    Proceed,
    Disabled,
    NoWork,
}

/// Autostart policy.
///
/// A forced start always proceeds. Otherwise production deployments never
/// autostart and other environments only start a worker when there is work
/// for it.
pub fn autostart_decision(force: bool, production: bool, has_work: bool) -> AutostartDecision {
    if force {
        AutostartDecision::Proceed
    } else if production {
        AutostartDecision::Disabled
    } else if !has_work {
        AutostartDecision::NoWork
    } else {
        AutostartDecision::Proceed
    }
}

/// Where the coordination files live and what to launch.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub state_dir: PathBuf,
    pub worker_bin: PathBuf,
    pub worker_args: Vec<OsString>,
}

impl SupervisorConfig {
    /// | Env Var            | Default                                  |
    /// |--------------------|------------------------------------------|
    /// | `WORKER_STATE_DIR` | `./logs`                                 |
    /// | `WORKER_BIN`       | `fleet-worker` next to the running binary |
    pub fn from_env() -> Self {
        let state_dir = std::env::var_os("WORKER_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));
        let worker_bin = std::env::var_os("WORKER_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(default_worker_bin);
        Self {
            state_dir,
            worker_bin,
            worker_args: Vec::new(),
        }
    }
}

/// `fleet-worker` in the directory of the current executable, falling back
/// to a `PATH` lookup.
fn default_worker_bin() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("fleet-worker")))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from("fleet-worker"))
}

/// Launches at most one transcode worker per state directory.
#[derive(Debug, Clone)]
pub struct WorkerSupervisor {
    config: SupervisorConfig,
}

impl WorkerSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.config.state_dir.join(LOCK_FILE)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.config.state_dir.join(PID_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.config.state_dir.join(LOG_FILE)
    }

    /// Apply the autostart policy, then launch if it allows.
    pub fn maybe_start(
        &self,
        force: bool,
        production: bool,
        has_work: bool,
    ) -> LaunchOutcome {
        match autostart_decision(force, production, has_work) {
            AutostartDecision::Disabled => {
                tracing::debug!(production, "Transcode worker autostart disabled");
                LaunchOutcome::Disabled
            }
            AutostartDecision::NoWork => {
                tracing::debug!("No transcode work queued, not starting a worker");
                LaunchOutcome::NoWork
            }
            AutostartDecision::Proceed => self.try_launch(),
        }
    }

    /// PID of the recorded worker if it is still alive.
    pub fn running_pid(&self) -> Option<u32> {
        read_pid(&self.pid_path()).filter(|&pid| pid_alive(pid))
    }

    /// Launch a worker unless one is already running.
    pub fn try_launch(&self) -> LaunchOutcome {
        let outcome = self.launch_inner();
        match &outcome {
            LaunchOutcome::Launched { pid } => {
                tracing::info!(pid, log = %self.log_path().display(), "Transcode worker launched");
            }
            LaunchOutcome::AlreadyRunning { pid } => {
                tracing::debug!(pid, "Transcode worker already running");
            }
            LaunchOutcome::LockBusy => {
                tracing::debug!("Another launcher holds the worker lock");
            }
            LaunchOutcome::Failed { reason } => {
                tracing::error!(reason = %reason, "Failed to launch transcode worker");
            }
            LaunchOutcome::Disabled | LaunchOutcome::NoWork => {}
        }
        outcome
    }

    fn launch_inner(&self) -> LaunchOutcome {
        if let Err(e) = fs::create_dir_all(&self.config.state_dir) {
            return LaunchOutcome::Failed {
                reason: format!(
                    "cannot create state dir {}: {e}",
                    self.config.state_dir.display()
                ),
            };
        }

        let _lock = match LaunchLock::try_acquire(&self.lock_path()) {
            Ok(Some(lock)) => lock,
            Ok(None) => return LaunchOutcome::LockBusy,
            Err(e) => {
                return LaunchOutcome::Failed {
                    reason: format!("cannot lock {}: {e}", self.lock_path().display()),
                }
            }
        };

        if let Some(pid) = self.running_pid() {
            return LaunchOutcome::AlreadyRunning { pid };
        }

        let pid = match self.spawn_worker() {
            Ok(pid) => pid,
            Err(e) => {
                return LaunchOutcome::Failed {
                    reason: format!(
                        "cannot start {}: {e}",
                        self.config.worker_bin.display()
                    ),
                }
            }
        };

        if let Err(e) = fs::write(self.pid_path(), pid.to_string()) {
            tracing::error!(
                pid,
                error = %e,
                "Worker started but its PID could not be recorded",
            );
        }

        LaunchOutcome::Launched { pid }
    }

    /// Start the worker detached in its own process group with output
    /// appended to the log file. A reaper thread waits on the child so an
    /// exited worker does not linger as a zombie that still answers the
    /// liveness probe.
    fn spawn_worker(&self) -> io::Result<u32> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&self.config.worker_bin);
        command
            .args(&self.config.worker_args)
            .env(AUTOSTARTED_ENV, "1")
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        let pid = child.id();

        if let Err(e) = std::thread::Builder::new()
            .name("worker-reaper".into())
            .spawn(move || {
                let _ = child.wait();
            })
        {
            tracing::warn!(pid, error = %e, "Could not start reaper thread for worker");
        }

        Ok(pid)
    }
}

/// Exclusive advisory lock on the launch lock file, released on drop.
pub struct LaunchLock {
    file: File,
}

impl LaunchLock {
    /// Try to take the lock without blocking. `Ok(None)` means someone else
    /// holds it.
    #[cfg(unix)]
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        // SAFETY: `file` owns a valid open descriptor for the whole call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(Some(Self { file }));
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            Ok(None)
        } else {
            Err(err)
        }
    }

    #[cfg(not(unix))]
    pub fn try_acquire(_path: &Path) -> io::Result<Option<Self>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "worker launch lock requires a Unix host",
        ))
    }
}

impl Drop for LaunchLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor stays open until `self.file` is dropped
            // right after this call.
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

/// Read a PID file. Missing, unreadable, non-numeric or non-positive
/// contents all read as `None`.
pub fn read_pid(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path).ok()?;
    raw.trim().parse::<u32>().ok().filter(|&pid| pid > 0)
}

/// Signal-0 liveness probe. Any error, including permission denied, reads
/// as not running.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    false
}
