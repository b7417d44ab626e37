//! Session error types.

use crate::types::{SessionKey, SessionPhase};

/// Errors produced by the session store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session {key} is busy ({phase})")]
    Conflict { key: SessionKey, phase: SessionPhase },

    #[error("no session for {0}")]
    NotFound(SessionKey),

    #[error("session {key} is {actual}, expected one of {expected:?}")]
    InvalidPhase {
        key: SessionKey,
        actual: SessionPhase,
        expected: Vec<SessionPhase>,
    },

    #[error("session {0} was cancelled")]
    Cancelled(SessionKey),
}
