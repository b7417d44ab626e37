//! External collaborator traits.
//!
//! The embedding application implements these on top of its messaging
//! platform client, preference storage and media tooling. Keeping them as
//! traits decouples the workflow from any transport and makes it testable
//! with mocks.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use relayfile_session::{MediaKind, SessionKey, SourceHandle};
use relayfile_transfer::RangeSource;
use serde::{Deserialize, Serialize};

use crate::types::{EnrichedMetadata, MediaMetadata};

/// Boxed future returned by collaborator methods.
pub type CollabFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque reference to a thumbnail image held by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThumbnailRef(pub String);

/// A source object ready for ranged retrieval.
pub struct ResolvedSource {
    pub source: Arc<dyn RangeSource>,
    /// Size reported by the platform; 0 when unknown.
    pub total_size: u64,
    pub original_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source object no longer exists: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Resolves source handles into something the transfer engine can read.
pub trait MediaSourceResolver: Send + Sync {
    /// Looks up the object behind `source`.
    fn resolve(&self, source: SourceHandle) -> CollabFuture<'_, Result<ResolvedSource, SourceError>>;

    /// Current profile photo of the chat, if any.
    fn profile_photo(&self, key: SessionKey) -> CollabFuture<'_, Option<ThumbnailRef>>;

    /// Downloads a thumbnail image to `dest`.
    fn download_thumbnail(
        &self,
        thumb: ThumbnailRef,
        dest: PathBuf,
    ) -> CollabFuture<'_, Result<(), SourceError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("status update throttled")]
    Throttled,

    #[error("status update failed: {0}")]
    Other(String),
}

/// Where human-readable progress goes (a status message the bot edits).
pub trait StatusSink: Send + Sync {
    fn update_status(&self, key: SessionKey, text: String) -> CollabFuture<'_, Result<(), StatusError>>;

    /// Removes the status message once the workflow is done with it.
    fn clear_status(&self, _key: SessionKey) -> CollabFuture<'_, Result<(), StatusError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Everything the publisher needs to send the renamed artifact.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub key: SessionKey,
    pub path: PathBuf,
    pub name: String,
    pub kind: MediaKind,
    pub caption: String,
    pub metadata: EnrichedMetadata,
}

/// Upload progress callback: `(sent, total)`.
pub type PublishProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Identifier of the published object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRef {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("{0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        request: PublishRequest,
        on_progress: PublishProgress,
    ) -> CollabFuture<'_, Result<PublishedRef, PublishError>>;
}

/// Read-only view of per-user preferences.
pub trait PreferenceStore: Send + Sync {
    fn saved_thumbnail(&self, key: SessionKey) -> CollabFuture<'_, Option<ThumbnailRef>>;
    fn caption_template(&self, key: SessionKey) -> CollabFuture<'_, Option<String>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported format")]
    Unsupported,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// Reads duration and dimensions from a local media file. Blocking.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<MediaMetadata, ExtractError>;
}

/// Re-encodes an image as a JPEG thumbnail. Blocking.
pub trait ImageNormalizer: Send + Sync {
    /// Writes `src` scaled to at most `max_side` pixels on its longest side
    /// to `dest` and returns the encoded size in bytes.
    fn normalize(&self, src: &Path, dest: &Path, max_side: u32, quality: u8)
    -> Result<u64, ExtractError>;
}

/// The full set of collaborators a [`RenameWorkflow`](crate::RenameWorkflow) uses.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn MediaSourceResolver>,
    pub status: Arc<dyn StatusSink>,
    pub publisher: Arc<dyn Publisher>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub normalizer: Arc<dyn ImageNormalizer>,
}
