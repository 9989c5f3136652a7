//! Dispatch engine.
//!
//! The device registry derives liveness from heartbeats; the task
//! dispatcher hands pending tasks to online devices and applies their
//! reports. Both are thin policy layers over the repositories: every state
//! change is one conditional update in the database.

pub mod dispatcher;
pub mod registry;

use fleet_core::error::CoreError;

use crate::error::AppError;

/// Failure of an engine operation: a rejected input or a store error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(e) => Self::Core(e),
            EngineError::Database(e) => Self::Database(e),
        }
    }
}
