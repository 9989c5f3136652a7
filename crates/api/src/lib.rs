//! Fleet center API server library.
//!
//! Exposes config, state, error handling, the dispatch engine and routes so
//! integration tests and the binary entrypoint can both use them.

pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;
