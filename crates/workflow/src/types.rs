//! Data types for the rename workflow.

use std::path::PathBuf;

use relayfile_session::{MediaKind, SessionKey, SessionPhase, SourceHandle};
use serde::{Deserialize, Serialize};

use crate::collaborators::PublishedRef;

/// Duration and dimensions read from a media file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<u64>,
}

/// Presentation metadata attached to a published object.
///
/// Every field is optional; the publisher sends whatever is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichedMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<PathBuf>,
}

/// An inbound media object.
#[derive(Debug, Clone)]
pub struct IntakeEvent {
    pub key: SessionKey,
    pub source: SourceHandle,
    /// Size reported by the platform; 0 when it did not say.
    pub declared_size: u64,
    pub original_name: Option<String>,
}

impl IntakeEvent {
    /// The declared name, or a kind-based placeholder when it is missing.
    pub fn original_name_or_default(&self) -> String {
        match self.original_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match self.source.kind {
                MediaKind::Document => "file".into(),
                MediaKind::Video => "video.mp4".into(),
                MediaKind::Audio => "audio.mp3".into(),
            },
        }
    }
}

/// What the user is told after intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeSummary {
    pub key: SessionKey,
    pub file_name: String,
    pub file_size: u64,
    /// `file_size` formatted for humans.
    pub size_text: String,
    /// True when an older pending session for the same chat was replaced.
    pub superseded: bool,
}

/// Which half of the workflow a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Transfer,
    Publish,
}

/// Event emitted by the workflow.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A session entered a new phase.
    PhaseChanged { key: SessionKey, phase: SessionPhase },
    /// Progress update.
    Progress {
        key: SessionKey,
        stage: ProgressStage,
        transferred: u64,
        total: u64,
    },
    /// The renamed object was published.
    Completed {
        key: SessionKey,
        published: PublishedRef,
    },
    /// The session failed and was retired.
    Failed { key: SessionKey, error: String },
    /// The session was cancelled and discarded.
    Cancelled { key: SessionKey },
}
