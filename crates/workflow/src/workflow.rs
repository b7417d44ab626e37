//! The rename state machine.
//!
//! Each public operation claims the session through
//! [`SessionStore::begin`], so events for one chat are never interleaved:
//! a second event while a transition is running gets
//! [`WorkflowError::SessionConflict`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relayfile_session::{
    CancelOutcome, MediaKind, SessionGuard, SessionKey, SessionPhase, SessionState, SessionStore,
};
use relayfile_transfer::{
    ProgressCallback, TransferCoordinator, TransferError, TransferProgress,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collaborators::{Collaborators, PublishProgress, PublishRequest, PublishedRef};
use crate::config::{ThumbnailPolicy, WorkflowConfig};
use crate::enricher::MetadataEnricher;
use crate::error::WorkflowError;
use crate::naming::{SanitizedName, sanitize_name};
use crate::render::{self, CaptionContext};
use crate::status::{StatusThrottle, deliver};
use crate::types::{IntakeEvent, IntakeSummary, ProgressStage, WorkflowEvent};

/// Event channel capacity.
const EVENT_BUFFER: usize = 256;

/// Subdirectory of a session directory holding the renamed artifact, so a
/// user-chosen name never collides with the thumbnail files next to it.
const ARTIFACT_DIR: &str = "out";

/// File name of the normalized publish thumbnail inside a session directory.
const THUMBNAIL_FILE: &str = "thumb.jpg";
const THUMBNAIL_SOURCE_FILE: &str = "thumb_source";

/// Drives rename sessions from intake to publish.
pub struct RenameWorkflow {
    config: WorkflowConfig,
    store: Arc<SessionStore>,
    collab: Collaborators,
    coordinator: TransferCoordinator,
    enricher: MetadataEnricher,
    events_tx: mpsc::Sender<WorkflowEvent>,
    events_rx: Option<mpsc::Receiver<WorkflowEvent>>,
}

impl RenameWorkflow {
    pub fn new(config: WorkflowConfig, store: Arc<SessionStore>, collab: Collaborators) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let coordinator = TransferCoordinator::new(config.transfer_options());
        let enricher = MetadataEnricher::new(
            Arc::clone(&collab.extractor),
            Arc::clone(&collab.normalizer),
            config.thumbnail_settings(),
        );
        Self {
            config,
            store,
            collab,
            coordinator,
            enricher,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<WorkflowEvent>> {
        self.events_rx.take()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Starts a session for an inbound media object.
    ///
    /// Replaces a session that is still waiting for input; refuses while
    /// the chat has a transfer or publish running.
    pub fn intake(&self, event: IntakeEvent) -> Result<IntakeSummary, WorkflowError> {
        let original_name = event.original_name_or_default();
        let guard = self.store.create(
            event.key,
            event.source.clone(),
            event.declared_size,
            original_name.clone(),
        )?;
        let superseded = guard.superseded();
        guard.advance(SessionPhase::AwaitingName)?;
        drop(guard);

        info!(
            key = %event.key,
            name = %original_name,
            size = event.declared_size,
            kind = %event.source.kind,
            "media received"
        );
        self.emit_phase(event.key, SessionPhase::AwaitingName);

        Ok(IntakeSummary {
            key: event.key,
            file_name: original_name,
            file_size: event.declared_size,
            size_text: render::humanbytes(event.declared_size as f64),
            superseded,
        })
    }

    /// Applies the user's name reply to the session waiting for it.
    pub fn submit_name(&self, key: SessionKey, reply: &str) -> Result<SanitizedName, WorkflowError> {
        let guard = self.store.begin(key, &[SessionPhase::AwaitingName])?;
        let state = guard.state()?;

        let sanitized = sanitize_name(reply, &state.declared_original_name, state.source.kind);
        let name = sanitized.name.clone();
        guard.update(|s| s.chosen_name = Some(name))?;
        guard.advance(SessionPhase::ReadyToFinalize)?;
        drop(guard);

        info!(key = %key, name = %sanitized.name, fell_back = sanitized.fell_back, "name chosen");
        self.emit_phase(key, SessionPhase::ReadyToFinalize);
        Ok(sanitized)
    }

    /// Transfers, enriches and publishes the session's object as `kind`.
    ///
    /// On every exit path the session's scratch directory is removed and
    /// the session is retired, as Done on success and Failed otherwise.
    pub async fn finalize(
        &self,
        key: SessionKey,
        kind: MediaKind,
    ) -> Result<PublishedRef, WorkflowError> {
        let guard = self.store.begin(key, &[SessionPhase::ReadyToFinalize])?;
        guard.update(|s| s.chosen_kind = Some(kind))?;
        let state = guard.advance(SessionPhase::Transferring)?;
        info!(key = %key, kind = %kind, "transfer starting");
        self.emit_phase(key, SessionPhase::Transferring);

        let scratch = self.session_dir(key);
        let result = self.run(&guard, &state, kind, &scratch).await;
        remove_scratch(&scratch).await;

        match result {
            Ok(published) => {
                guard.retire(SessionPhase::Done);
                self.emit_phase(key, SessionPhase::Done);
                self.emit(WorkflowEvent::Completed {
                    key,
                    published: published.clone(),
                });
                Ok(published)
            }
            Err(e) => {
                deliver(self.collab.status.as_ref(), key, render::failure_status(&e)).await;
                guard.retire(SessionPhase::Failed);
                if e.is_cancelled() {
                    info!(key = %key, "rename cancelled");
                    self.emit(WorkflowEvent::Cancelled { key });
                } else {
                    error!(key = %key, error = %e, "rename failed");
                    self.emit_phase(key, SessionPhase::Failed);
                    self.emit(WorkflowEvent::Failed {
                        key,
                        error: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Cancels the chat's session. Returns `false` when there is nothing
    /// to cancel or the session is already publishing.
    pub fn cancel(&self, key: SessionKey) -> bool {
        match self.store.cancel(key) {
            CancelOutcome::Removed => {
                self.emit(WorkflowEvent::Cancelled { key });
                true
            }
            // The running finalize reports the cancellation itself.
            CancelOutcome::Signalled => true,
            CancelOutcome::NotCancellable => {
                debug!(key = %key, "cancel refused while publishing");
                false
            }
            CancelOutcome::NotFound => false,
        }
    }

    /// Drops sessions that waited for input longer than the configured
    /// timeout.
    pub fn sweep_stale(&self) -> Vec<SessionKey> {
        self.store
            .sweep_stale(Instant::now(), self.config.session_timeout())
    }

    /// Runs [`sweep_stale`](Self::sweep_stale) periodically until `stop`
    /// fires.
    pub fn spawn_sweeper(&self, stop: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.store).spawn_sweeper(
            self.config.sweep_interval(),
            self.config.session_timeout(),
            stop,
        )
    }

    async fn run(
        &self,
        guard: &SessionGuard<'_>,
        state: &SessionState,
        kind: MediaKind,
        scratch: &Path,
    ) -> Result<PublishedRef, WorkflowError> {
        let key = state.key;
        let cancel = guard.cancel_token();
        let name = state
            .chosen_name
            .clone()
            .unwrap_or_else(|| state.declared_original_name.clone());

        deliver(self.collab.status.as_ref(), key, render::PREPARING.to_string()).await;

        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkflowError::Cancelled(key)),
            resolved = self.collab.resolver.resolve(state.source.clone()) => resolved?,
        };
        let total = if state.declared_size > 0 {
            state.declared_size
        } else {
            resolved.total_size
        };

        let artifact_dir = scratch.join(ARTIFACT_DIR);
        tokio::fs::create_dir_all(&artifact_dir).await?;
        let artifact = artifact_dir.join(&name);

        // Transfer.
        let throttle = self.throttle(key);
        let on_progress = self.transfer_progress(key, &name, &throttle);
        let report = self
            .coordinator
            .execute(resolved.source, total, &artifact, cancel.clone(), Some(on_progress))
            .await;
        throttle.finish().await;
        let report = report.map_err(|e| match e {
            TransferError::Cancelled => WorkflowError::Cancelled(key),
            e => WorkflowError::Transfer(e),
        })?;
        deliver(
            self.collab.status.as_ref(),
            key,
            render::transfer_complete(report.total_size),
        )
        .await;

        guard.advance(SessionPhase::Publishing)?;
        info!(key = %key, bytes = report.total_size, "publishing");
        self.emit_phase(key, SessionPhase::Publishing);

        // Enrich.
        let thumb_source = self.thumbnail_source(key, scratch).await;
        let metadata = self
            .enricher
            .enrich(
                &artifact,
                kind,
                thumb_source.as_deref(),
                &scratch.join(THUMBNAIL_FILE),
            )
            .await;

        let template = self
            .collab
            .preferences
            .caption_template(key)
            .await
            .unwrap_or_else(|| self.config.default_caption.clone());
        let caption = render::render_caption(
            &template,
            &CaptionContext {
                filename: &name,
                size: report.total_size,
                duration_secs: metadata.duration_secs,
            },
        );

        // Publish.
        let throttle = self.throttle(key);
        let on_progress = self.publish_progress(key, &name, &throttle);
        let request = PublishRequest {
            key,
            path: artifact,
            name,
            kind,
            caption,
            metadata,
        };
        let published = self.collab.publisher.publish(request, on_progress).await;
        throttle.finish().await;
        let published = published?;

        deliver(self.collab.status.as_ref(), key, render::DONE.to_string()).await;
        if let Err(e) = self.collab.status.clear_status(key).await {
            debug!(key = %key, error = %e, "failed to clear status");
        }
        Ok(published)
    }

    fn throttle(&self, key: SessionKey) -> StatusThrottle {
        StatusThrottle::spawn(
            Arc::clone(&self.collab.status),
            key,
            self.config.progress_interval(),
        )
    }

    fn transfer_progress(
        &self,
        key: SessionKey,
        name: &str,
        throttle: &StatusThrottle,
    ) -> ProgressCallback {
        let title = format!("Downloading {name}");
        let poster = throttle.poster();
        let events = self.events_tx.clone();
        Arc::new(move |p: TransferProgress| {
            poster.post(render::progress_status(&title, &p));
            let _ = events.try_send(WorkflowEvent::Progress {
                key,
                stage: ProgressStage::Transfer,
                transferred: p.transferred,
                total: p.total,
            });
        })
    }

    fn publish_progress(
        &self,
        key: SessionKey,
        name: &str,
        throttle: &StatusThrottle,
    ) -> PublishProgress {
        let title = format!("Uploading {name}");
        let poster = throttle.poster();
        let events = self.events_tx.clone();
        let started = Instant::now();
        Arc::new(move |sent: u64, total: u64| {
            let p = TransferProgress::new(sent, total, started.elapsed());
            poster.post(render::progress_status(&title, &p));
            let _ = events.try_send(WorkflowEvent::Progress {
                key,
                stage: ProgressStage::Publish,
                transferred: sent,
                total,
            });
        })
    }

    /// Downloads the thumbnail the policy picks, if any.
    async fn thumbnail_source(&self, key: SessionKey, scratch: &Path) -> Option<PathBuf> {
        let prefs = &self.collab.preferences;
        let thumb = match self.config.thumbnail_policy {
            ThumbnailPolicy::Disabled => None,
            ThumbnailPolicy::Saved => prefs.saved_thumbnail(key).await,
            ThumbnailPolicy::SavedOrProfilePhoto => match prefs.saved_thumbnail(key).await {
                Some(thumb) => Some(thumb),
                None => self.collab.resolver.profile_photo(key).await,
            },
        }?;

        let dest = scratch.join(THUMBNAIL_SOURCE_FILE);
        match self
            .collab
            .resolver
            .download_thumbnail(thumb, dest.clone())
            .await
        {
            Ok(()) => Some(dest),
            Err(e) => {
                warn!(key = %key, error = %e, "thumbnail download failed");
                None
            }
        }
    }

    fn session_dir(&self, key: SessionKey) -> PathBuf {
        self.config.scratch_dir.join(key.to_string())
    }

    fn emit_phase(&self, key: SessionKey, phase: SessionPhase) {
        self.emit(WorkflowEvent::PhaseChanged { key, phase });
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "workflow event dropped");
        }
    }
}

async fn remove_scratch(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(path = %dir.display(), "scratch directory removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove scratch directory"),
    }
}
