//! `fleet-agent` library crate.
//!
//! The on-device side of the dispatch protocol: identity, the HTTP client
//! for the center, the automation executor seam and the heartbeat/poll
//! loops. The binary entrypoint lives in `main.rs`.

pub mod client;
pub mod config;
pub mod executor;
pub mod identity;
pub mod runner;
