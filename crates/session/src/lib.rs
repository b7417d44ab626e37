//! Session tracking for the rename workflow.
//!
//! Every chat has at most one [`SessionState`]. The [`SessionStore`] hands
//! out a [`SessionGuard`] for each transition; while a guard is alive the
//! session is busy and any other event for the same key is rejected with
//! [`SessionError::Conflict`] instead of racing it.

pub mod error;
pub mod store;
pub mod types;

pub use error::SessionError;
pub use store::{CancelOutcome, SessionGuard, SessionStore};
pub use types::{MediaKind, SessionKey, SessionPhase, SessionState, SourceHandle};
