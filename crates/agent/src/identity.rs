//! Stable device identity.
//!
//! A device keeps the same id across restarts so its accounts stay
//! attached to it. Unless `DEVICE_ID` pins one, the id is generated once
//! and stored in a small file next to the agent.

use std::io;
use std::path::Path;

use fleet_core::device::validate_device_id;

/// Generate a fresh id of the form `device_<12 hex chars>`.
pub fn generate_device_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("device_{}", &hex[..12])
}

/// Read the id stored at `path`, or generate and store a new one.
///
/// A file holding something that is not a valid device id is replaced.
pub fn load_or_create(path: &Path) -> io::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let id = raw.trim();
            if validate_device_id(id).is_ok() {
                return Ok(id.to_string());
            }
            tracing::warn!(path = %path.display(), "Stored device id is invalid, generating a new one");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let id = generate_device_id();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &id)?;
    tracing::info!(device_id = %id, path = %path.display(), "Generated device id");
    Ok(id)
}
