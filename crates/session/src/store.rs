//! In-memory session store with per-session claim guards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::types::{SessionKey, SessionPhase, SessionState, SourceHandle};

struct Entry {
    state: SessionState,
    busy: bool,
    cancel: CancellationToken,
    generation: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<SessionKey, Entry>,
    next_generation: u64,
}

/// Result of [`SessionStore::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The session was idle and has been discarded.
    Removed,
    /// A transition is running; its token fired and it will discard the
    /// session when it observes the cancellation.
    Signalled,
    /// The session is publishing and cannot be interrupted.
    NotCancellable,
    NotFound,
}

/// Holds every live session.
///
/// The map lock is only held for bookkeeping, never across an `.await`.
/// Long-running work happens under a [`SessionGuard`], which marks the
/// entry busy without keeping the map locked, so one chat's transfer does
/// not block events for other chats.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a new session for `key` and claims it.
    ///
    /// A pending session (waiting for a name or a kind) is superseded: its
    /// cancellation token fires and it is replaced. A session that is busy
    /// or transferring/publishing is left alone and the call fails with
    /// [`SessionError::Conflict`].
    pub fn create(
        &self,
        key: SessionKey,
        source: SourceHandle,
        declared_size: u64,
        original_name: impl Into<String>,
    ) -> Result<SessionGuard<'_>, SessionError> {
        let mut inner = self.lock();

        let superseded = match inner.entries.get(&key) {
            Some(existing) if existing.busy || existing.state.phase.is_active() => {
                return Err(SessionError::Conflict {
                    key,
                    phase: existing.state.phase,
                });
            }
            Some(existing) => {
                existing.cancel.cancel();
                info!(key = %key, phase = %existing.state.phase, "superseding pending session");
                true
            }
            None => false,
        };

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let cancel = CancellationToken::new();
        inner.entries.insert(
            key,
            Entry {
                state: SessionState::new(key, source, declared_size, original_name),
                busy: true,
                cancel: cancel.clone(),
                generation,
            },
        );

        Ok(SessionGuard {
            store: self,
            key,
            generation,
            cancel,
            superseded,
        })
    }

    /// Claims the session for a transition out of one of `accepted`.
    pub fn begin(
        &self,
        key: SessionKey,
        accepted: &[SessionPhase],
    ) -> Result<SessionGuard<'_>, SessionError> {
        let mut inner = self.lock();
        let entry = inner
            .entries
            .get_mut(&key)
            .ok_or(SessionError::NotFound(key))?;

        if entry.busy || entry.state.phase.is_active() {
            return Err(SessionError::Conflict {
                key,
                phase: entry.state.phase,
            });
        }
        if !accepted.contains(&entry.state.phase) {
            return Err(SessionError::InvalidPhase {
                key,
                actual: entry.state.phase,
                expected: accepted.to_vec(),
            });
        }

        entry.busy = true;
        Ok(SessionGuard {
            store: self,
            key,
            generation: entry.generation,
            cancel: entry.cancel.clone(),
            superseded: false,
        })
    }

    /// Returns a copy of the session for `key`.
    pub fn get(&self, key: SessionKey) -> Option<SessionState> {
        self.lock().entries.get(&key).map(|e| e.state.clone())
    }

    pub fn phase(&self, key: SessionKey) -> Option<SessionPhase> {
        self.lock().entries.get(&key).map(|e| e.state.phase)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Cancels the session for `key`, unless it is publishing.
    pub fn cancel(&self, key: SessionKey) -> CancelOutcome {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get(&key) else {
            return CancelOutcome::NotFound;
        };

        if entry.state.phase == SessionPhase::Publishing {
            return CancelOutcome::NotCancellable;
        }

        entry.cancel.cancel();
        if entry.busy {
            debug!(key = %key, phase = %entry.state.phase, "cancellation signalled");
            return CancelOutcome::Signalled;
        }

        inner.entries.remove(&key);
        info!(key = %key, "session cancelled");
        CancelOutcome::Removed
    }

    /// Removes pending sessions whose last transition is older than
    /// `max_age` at `now`. Busy and active sessions are never swept.
    pub fn sweep_stale(&self, now: Instant, max_age: Duration) -> Vec<SessionKey> {
        let mut inner = self.lock();
        let stale: Vec<SessionKey> = inner
            .entries
            .iter()
            .filter(|(_, e)| {
                !e.busy
                    && e.state.phase.is_pending()
                    && now.saturating_duration_since(e.state.last_transition_at) > max_age
            })
            .map(|(k, _)| *k)
            .collect();

        for key in &stale {
            if let Some(entry) = inner.entries.remove(key) {
                entry.cancel.cancel();
                info!(key = %key, phase = %entry.state.phase, "stale session expired");
            }
        }
        stale
    }

    /// Runs [`sweep_stale`](Self::sweep_stale) every `interval` until
    /// `stop` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        max_age: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let swept = self.sweep_stale(Instant::now(), max_age);
                        if !swept.is_empty() {
                            debug!(count = swept.len(), "sweeper removed stale sessions");
                        }
                    }
                }
            }
        })
    }
}

/// Exclusive claim on one session.
///
/// Dropping the guard releases the claim. If the session was cancelled
/// while claimed, dropping the guard also discards it.
pub struct SessionGuard<'a> {
    store: &'a SessionStore,
    key: SessionKey,
    generation: u64,
    cancel: CancellationToken,
    superseded: bool,
}

impl SessionGuard<'_> {
    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Whether creating this session replaced a pending one.
    pub fn superseded(&self) -> bool {
        self.superseded
    }

    /// Fires when the session is cancelled or superseded.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns a copy of the claimed session.
    pub fn state(&self) -> Result<SessionState, SessionError> {
        self.with_entry(|e| e.state.clone())
    }

    /// Mutates the claimed session in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> Result<R, SessionError> {
        self.with_entry(|e| f(&mut e.state))
    }

    /// Moves the session to `phase`, refusing if it was cancelled.
    pub fn advance(&self, phase: SessionPhase) -> Result<SessionState, SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled(self.key));
        }
        let state = self.with_entry(|e| {
            e.state.phase = phase;
            e.state.last_transition_at = Instant::now();
            e.state.clone()
        })?;
        debug!(key = %self.key, phase = %phase, "session advanced");
        Ok(state)
    }

    /// Removes the session from the store, recording `phase` as its final
    /// phase in the returned copy.
    pub fn retire(self, phase: SessionPhase) -> Option<SessionState> {
        let mut inner = self.store.lock();
        let owned = inner
            .entries
            .get(&self.key)
            .is_some_and(|e| e.generation == self.generation);
        if !owned {
            return None;
        }
        let mut entry = inner.entries.remove(&self.key)?;
        entry.state.phase = phase;
        entry.state.last_transition_at = Instant::now();
        info!(key = %self.key, phase = %phase, "session retired");
        Some(entry.state)
    }

    fn with_entry<R>(&self, f: impl FnOnce(&mut Entry) -> R) -> Result<R, SessionError> {
        let mut inner = self.store.lock();
        match inner.entries.get_mut(&self.key) {
            Some(entry) if entry.generation == self.generation => Ok(f(entry)),
            _ => Err(SessionError::NotFound(self.key)),
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.store.lock();
        let Some(entry) = inner.entries.get_mut(&self.key) else {
            return;
        };
        if entry.generation != self.generation {
            return;
        }
        if entry.cancel.is_cancelled() {
            inner.entries.remove(&self.key);
            debug!(key = %self.key, "cancelled session discarded");
        } else {
            entry.busy = false;
        }
    }
}
