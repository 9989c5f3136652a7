//! FFmpeg/FFprobe helpers for material probing and transcoding.
//!
//! The probe decides whether a freshly uploaded material is already in a
//! format every device can play; the transcode arguments and progress
//! parser drive the worker's ffmpeg child process.

use std::ffi::OsString;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::transcode::MediaKind;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("media file not found: {0}")]
    MediaNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub pix_fmt: Option<String>,
    /// Bit depth as a decimal string, e.g. "8" or "10".
    pub bits_per_raw_sample: Option<String>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
    pub format_name: Option<String>,
}

/// Probe summary persisted in `materials.meta_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub duration_secs: f64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub size_bytes: Option<i64>,
    pub format_name: Option<String>,
    pub video_codec: Option<String>,
    pub pix_fmt: Option<String>,
    pub audio_codec: Option<String>,
}

impl MediaSummary {
    pub fn from_probe(probe: &FfprobeOutput) -> Self {
        let video = first_stream(probe, "video");
        let audio = first_stream(probe, "audio");
        Self {
            duration_secs: parse_duration(probe),
            width: video.and_then(|s| s.width),
            height: video.and_then(|s| s.height),
            size_bytes: probe.format.size.as_deref().and_then(|s| s.parse().ok()),
            format_name: probe.format.format_name.clone(),
            video_codec: video.and_then(|s| s.codec_name.clone()),
            pix_fmt: video.and_then(|s| s.pix_fmt.clone()),
            audio_codec: audio.and_then(|s| s.codec_name.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a media file and return the parsed JSON output.
pub async fn probe_media(ffprobe: &Path, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::MediaNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

fn first_stream<'a>(probe: &'a FfprobeOutput, codec_type: &str) -> Option<&'a FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some(codec_type))
}

/// Parse the media duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Try format-level duration first.
    if let Some(secs) = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
    {
        return secs;
    }
    // Fall back to the first stream that carries one.
    probe
        .streams
        .iter()
        .filter_map(|s| s.duration.as_deref())
        .find_map(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Whether a material of `kind` must be transcoded before devices can use it.
///
/// Video is left alone when it is already 8-bit H.264 in yuv420p; audio
/// when it is already MP3. Anything else, including a file with no stream
/// of the expected type, gets transcoded.
pub fn needs_transcode(kind: MediaKind, probe: &FfprobeOutput) -> bool {
    match kind {
        MediaKind::Video => {
            let Some(video) = first_stream(probe, "video") else {
                return true;
            };
            let h264 = video.codec_name.as_deref() == Some("h264");
            let yuv420p = video.pix_fmt.as_deref() == Some("yuv420p");
            let eight_bit = video
                .bits_per_raw_sample
                .as_deref()
                .and_then(|b| b.parse::<u32>().ok())
                .map_or(true, |bits| bits <= 8);
            !(h264 && yuv420p && eight_bit)
        }
        MediaKind::Audio => {
            first_stream(probe, "audio").and_then(|s| s.codec_name.as_deref()) != Some("mp3")
        }
    }
}

// ---------------------------------------------------------------------------
// Transcoding
// ---------------------------------------------------------------------------

/// Full ffmpeg argument list for transcoding `input` into `output`.
///
/// Progress is written as `key=value` lines on stdout (`-progress pipe:1`).
pub fn transcode_args(kind: MediaKind, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());

    let codec_args: &[&str] = match kind {
        MediaKind::Video => &[
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-preset",
            "veryfast",
            "-crf",
            "23",
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "-movflags",
            "+faststart",
        ],
        MediaKind::Audio => &["-vn", "-c:a", "libmp3lame", "-b:a", "192k"],
    };
    args.extend(codec_args.iter().map(OsString::from));
    args.extend(["-progress", "pipe:1", "-nostats"].map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

/// One meaningful line of ffmpeg `-progress` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Encoded position in microseconds.
    OutTime(i64),
    /// ffmpeg finished writing the output.
    End,
}

/// Parse a `-progress` line.
///
/// `out_time_ms` is reported in microseconds despite its name; `out_time_us`
/// is used when present. Every other key is ignored.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse().ok().map(ProgressEvent::OutTime),
        "progress" if value == "end" => Some(ProgressEvent::End),
        _ => None,
    }
}
