//! Rename workflow for inbound media objects.
//!
//! The crate drives one chat's rename operation end to end:
//!
//! 1. **Intake**: a media object arrives and a session starts
//! 2. **Naming**: the user's reply becomes a sanitized file name
//! 3. **Finalize**: the user picks an output kind; the object is
//!    transferred with [`relayfile_transfer::TransferCoordinator`]
//! 4. **Enrich**: duration, dimensions and thumbnail are derived
//! 5. **Publish**: the renamed artifact is handed to the [`Publisher`]
//!
//! Everything platform-specific sits behind the collaborator traits in
//! [`collaborators`]; this crate has no transport of its own.

pub mod collaborators;
pub mod config;
pub mod enricher;
pub mod error;
pub mod naming;
pub mod render;
pub mod status;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use collaborators::{
    CollabFuture, Collaborators, ExtractError, ImageNormalizer, MediaSourceResolver,
    MetadataExtractor, PreferenceStore, PublishError, PublishProgress, PublishRequest,
    PublishedRef, Publisher, ResolvedSource, SourceError, StatusError, StatusSink, ThumbnailRef,
};
pub use config::{ThumbnailPolicy, WorkflowConfig};
pub use enricher::{MetadataEnricher, ThumbnailSettings};
pub use error::WorkflowError;
pub use naming::{SanitizedName, sanitize_name};
pub use status::StatusThrottle;
pub use types::{
    EnrichedMetadata, IntakeEvent, IntakeSummary, MediaMetadata, ProgressStage, WorkflowEvent,
};
pub use workflow::RenameWorkflow;
