//! `fleet-worker` library crate.
//!
//! Holds the transcode queue service shared with the center, the singleton
//! worker supervisor, and the lease-execute loop run by the `fleet-worker`
//! binary.

pub mod queue;
pub mod runner;
pub mod supervisor;

/// Lease owner identity for this process: `hostname:pid`.
pub fn worker_identity() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());
    format!("{host}:{}", std::process::id())
}
