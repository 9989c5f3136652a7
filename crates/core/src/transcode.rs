//! Transcode queue policy: media kinds, output naming, progress and error
//! text limits.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Attempts a transcode task gets before it is failed for good.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// A running lease older than this is presumed abandoned.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Error text stored on a task keeps only this many trailing characters.
pub const MAX_ERROR_CHARS: usize = 8000;

/// Highest progress value reported while ffmpeg is still running. 100 is
/// reserved for a completed task.
pub const MAX_RUNNING_PROGRESS: i16 = 99;

/// Directory (relative to the media root) receiving transcoded outputs.
pub const OUTPUT_DIR: &str = "transcoded";

/// Kind of media asset, shared by materials and their transcode tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Container extension of the playable output for this kind.
    pub fn output_extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(CoreError::Validation(format!("Unknown media kind '{other}'"))),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output path for a material's transcode, relative to the media root.
///
/// `transcoded/<material_id>_<stem>.<ext>`, so re-transcoding a material
/// overwrites its previous output rather than piling up files.
pub fn output_path_for(material_id: DbId, original_path: &str, kind: MediaKind) -> String {
    let stem = Path::new(original_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "material".to_string());
    format!(
        "{OUTPUT_DIR}/{material_id}_{stem}.{}",
        kind.output_extension()
    )
}

/// Percentage of `duration_secs` covered by ffmpeg's `out_time` (in
/// microseconds), capped at [`MAX_RUNNING_PROGRESS`].
///
/// Returns `None` when the duration is unknown.
pub fn progress_percent(out_time_us: i64, duration_secs: f64) -> Option<i16> {
    if duration_secs.is_nan() || duration_secs <= 0.0 {
        return None;
    }
    let pct = out_time_us as f64 / (duration_secs * 1_000_000.0) * 100.0;
    Some(pct.clamp(0.0, MAX_RUNNING_PROGRESS as f64) as i16)
}

/// Keep the last `max_chars` characters of an error message.
///
/// ffmpeg puts the useful part of its diagnostics at the end.
pub fn truncate_error(message: &str, max_chars: usize) -> String {
    let count = message.chars().count();
    if count <= max_chars {
        return message.to_string();
    }
    message.chars().skip(count - max_chars).collect()
}
