//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the `Deserialize` DTOs the HTTP layer accepts.

pub mod account;
pub mod device;
pub mod material;
pub mod message;
pub mod status;
pub mod task;
pub mod transcode;
