//! Automation task payloads.
//!
//! Video, chat and listen tasks share one state machine and one table.
//! They differ only in payload, modelled here as a tagged enum whose
//! `kind` tag doubles as the value of the `tasks.kind` column.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Maximum number of tags on a video task.
pub const MAX_VIDEO_TAGS: usize = 20;

/// Discriminator for the three task variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Video,
    Chat,
    Listen,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Chat => "chat",
            Self::Listen => "listen",
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "chat" => Ok(Self::Chat),
            "listen" => Ok(Self::Listen),
            other => Err(CoreError::Validation(format!("Unknown task kind '{other}'"))),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publish a video to the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPayload {
    pub video_url: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Scheduled publish time as understood by the platform, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Send one chat message to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub target_user: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenAction {
    Start,
    Stop,
}

/// Start or stop listening for inbound messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenPayload {
    pub action: ListenAction,
}

/// Kind-tagged task body, e.g. `{"kind": "chat", "target_user": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    Video(VideoPayload),
    Chat(ChatPayload),
    Listen(ListenPayload),
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Video(_) => TaskKind::Video,
            Self::Chat(_) => TaskKind::Chat,
            Self::Listen(_) => TaskKind::Listen,
        }
    }

    /// Check the fields a device needs before it can act on the task.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::Video(v) => {
                require_non_blank("video_url", &v.video_url)?;
                require_non_blank("title", &v.title)?;
                if v.tags.len() > MAX_VIDEO_TAGS {
                    return Err(CoreError::Validation(format!(
                        "A video task may carry at most {MAX_VIDEO_TAGS} tags"
                    )));
                }
                if v.tags.iter().any(|t| t.trim().is_empty()) {
                    return Err(CoreError::Validation("Tags must not be blank".into()));
                }
                Ok(())
            }
            Self::Chat(c) => {
                require_non_blank("target_user", &c.target_user)?;
                require_non_blank("message", &c.message)
            }
            Self::Listen(_) => Ok(()),
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be blank")));
    }
    Ok(())
}

/// Outcome a device reports for a claimed task.
///
/// `progress` without `success` set is not meaningful here; progress-only
/// updates go through [`ProgressReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    /// External id of the reporting device. Must match the claimer.
    pub device_id: String,
    /// Token handed out with the claim. A report for an earlier claim of
    /// the same task carries a stale token and is ignored.
    pub claim_token: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i16>,
    /// The platform rejected the stored session; the account must log in again.
    #[serde(default)]
    pub auth_failed: bool,
}

/// Intermediate progress for a running task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub device_id: String,
    pub claim_token: Uuid,
    pub progress: i16,
}

/// Clamp a reported percentage into `0..=100`.
pub fn clamp_progress(progress: i16) -> i16 {
    progress.clamp(0, 100)
}
