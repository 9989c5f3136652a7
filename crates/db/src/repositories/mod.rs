//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod account_repo;
pub mod device_repo;
pub mod material_repo;
pub mod message_repo;
pub mod task_repo;
pub mod transcode_repo;

pub use account_repo::AccountRepo;
pub use device_repo::DeviceRepo;
pub use material_repo::MaterialRepo;
pub use message_repo::MessageRepo;
pub use task_repo::TaskRepo;
pub use transcode_repo::TranscodeRepo;

/// Maximum page size for list endpoints.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for list endpoints.
pub const DEFAULT_LIMIT: i64 = 50;

/// Clamp optional `limit`/`offset` query parameters.
pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}
