//! Background tasks spawned by the API server.

pub mod task_reaper;
