//! Session data types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Identifies one chat/user conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(pub i64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SessionKey {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Container kind of an inbound or republished object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Document,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Extension appended to a chosen name that has none.
    pub fn default_extension(&self) -> Option<&'static str> {
        match self {
            Self::Document => None,
            Self::Video => Some("mp4"),
            Self::Audio => Some("mp3"),
        }
    }

    /// Whether duration/dimensions can be extracted for this kind.
    pub fn has_media_metadata(&self) -> bool {
        !matches!(self, Self::Document)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "doc" | "file" => Ok(Self::Document),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// Reference to the inbound object; bytes are fetched lazily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHandle {
    pub message_id: i64,
    pub kind: MediaKind,
}

/// Lifecycle of one rename session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    AwaitingName,
    ReadyToFinalize,
    Transferring,
    Publishing,
    Failed,
    Done,
}

impl SessionPhase {
    /// Phases that own an in-flight transfer or publish.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Transferring | Self::Publishing)
    }

    /// Phases waiting on user input, which a new intake may replace.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Idle | Self::AwaitingName | Self::ReadyToFinalize)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Done)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingName => "awaiting name",
            Self::ReadyToFinalize => "ready to finalize",
            Self::Transferring => "transferring",
            Self::Publishing => "publishing",
            Self::Failed => "failed",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// One chat's pending rename operation.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub key: SessionKey,
    pub source: SourceHandle,
    /// Size reported at intake; 0 when the platform did not say.
    pub declared_size: u64,
    pub declared_original_name: String,
    pub phase: SessionPhase,
    pub chosen_name: Option<String>,
    pub chosen_kind: Option<MediaKind>,
    pub created_at: Instant,
    pub last_transition_at: Instant,
}

impl SessionState {
    pub fn new(
        key: SessionKey,
        source: SourceHandle,
        declared_size: u64,
        declared_original_name: impl Into<String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            key,
            source,
            declared_size,
            declared_original_name: declared_original_name.into(),
            phase: SessionPhase::Idle,
            chosen_name: None,
            chosen_kind: None,
            created_at: now,
            last_transition_at: now,
        }
    }
}
