//! Workflow error types.

use relayfile_session::{SessionError, SessionKey, SessionPhase};
use relayfile_transfer::TransferError;

use crate::collaborators::{PublishError, SourceError};

/// Errors produced by the rename workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("{0}")]
    Transfer(#[from] TransferError),

    #[error("{0}")]
    Publish(#[from] PublishError),

    #[error("a rename is already in progress for {key} ({phase})")]
    SessionConflict { key: SessionKey, phase: SessionPhase },

    #[error("no pending rename for {0}")]
    NotFound(SessionKey),

    #[error("session {key} is {actual}, cannot do that now")]
    InvalidState { key: SessionKey, actual: SessionPhase },

    #[error("rename for {0} was cancelled")]
    Cancelled(SessionKey),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SessionError> for WorkflowError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Conflict { key, phase } => Self::SessionConflict { key, phase },
            SessionError::NotFound(key) => Self::NotFound(key),
            SessionError::InvalidPhase { key, actual, .. } => Self::InvalidState { key, actual },
            SessionError::Cancelled(key) => Self::Cancelled(key),
        }
    }
}

impl WorkflowError {
    /// Whether the error came from the user cancelling.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled(_) | Self::Transfer(TransferError::Cancelled)
        )
    }
}
