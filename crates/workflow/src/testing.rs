//! Mock collaborators and a test harness for the workflow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relayfile_session::{SessionKey, SessionStore, SourceHandle};
use relayfile_transfer::{
    ByteRange, ByteStream, FetchError, FileRangeSource, RangeSource, SourceFuture,
};

use crate::collaborators::*;
use crate::config::WorkflowConfig;
use crate::types::MediaMetadata;
use crate::workflow::RenameWorkflow;

pub(crate) fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + i / 253) % 253) as u8).collect()
}

// --- status ---

#[derive(Default)]
pub(crate) struct RecordingStatus {
    texts: Mutex<HashMap<SessionKey, Vec<String>>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingStatus {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn texts(&self, key: SessionKey) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl StatusSink for RecordingStatus {
    fn update_status(&self, key: SessionKey, text: String) -> CollabFuture<'_, Result<(), StatusError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StatusError::Other("rate limited".into()));
            }
            self.texts.lock().unwrap().entry(key).or_default().push(text);
            Ok(())
        })
    }
}

// --- metadata tools ---

pub(crate) struct FakeExtractor {
    result: Option<MediaMetadata>,
    calls: Arc<AtomicUsize>,
}

impl FakeExtractor {
    pub(crate) fn ok(meta: MediaMetadata) -> Self {
        Self {
            result: Some(meta),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            result: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl MetadataExtractor for FakeExtractor {
    fn extract(&self, _path: &Path) -> Result<MediaMetadata, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .ok_or_else(|| ExtractError::Failed("not a media file".into()))
    }
}

/// Writes a placeholder thumbnail whose reported size depends on quality.
pub(crate) struct FakeNormalizer {
    sizes: HashMap<u8, u64>,
    fail: bool,
    calls: Mutex<Vec<(u32, u8)>>,
}

impl FakeNormalizer {
    pub(crate) fn with_sizes(sizes: &[(u8, u64)]) -> Self {
        Self {
            sizes: sizes.iter().copied().collect(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_sizes(&[])
        }
    }

    pub(crate) fn qualities(&self) -> Vec<u8> {
        self.calls.lock().unwrap().iter().map(|(_, q)| *q).collect()
    }

    pub(crate) fn max_sides(&self) -> Vec<u32> {
        self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }
}

impl ImageNormalizer for FakeNormalizer {
    fn normalize(
        &self,
        _src: &Path,
        dest: &Path,
        max_side: u32,
        quality: u8,
    ) -> Result<u64, ExtractError> {
        self.calls.lock().unwrap().push((max_side, quality));
        if self.fail {
            return Err(ExtractError::Unsupported);
        }
        std::fs::write(dest, b"jpeg")?;
        Ok(self.sizes.get(&quality).copied().unwrap_or(1000))
    }
}

// --- sources ---

/// Wraps a file source, delaying every request and optionally failing one
/// range.
struct SlowSource {
    inner: FileRangeSource,
    delay: Duration,
    fail_index: Option<usize>,
}

impl RangeSource for SlowSource {
    fn fetch(&self, range: Option<ByteRange>) -> SourceFuture<'_, Result<ByteStream, FetchError>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(r) = range {
                if Some(r.index) == self.fail_index {
                    return Err(FetchError::Status {
                        status: 404,
                        range: r.header_value(),
                    });
                }
            }
            self.inner.fetch(range).await
        })
    }

    fn probe_size(&self) -> SourceFuture<'_, Result<Option<u64>, FetchError>> {
        self.inner.probe_size()
    }
}

#[derive(Default)]
struct ResolverSettings {
    delay: Duration,
    fail_index: Option<usize>,
    missing: bool,
    profile_photo: bool,
}

pub(crate) struct FakeResolver {
    path: PathBuf,
    size: u64,
    settings: Mutex<ResolverSettings>,
}

impl MediaSourceResolver for FakeResolver {
    fn resolve(&self, _source: SourceHandle) -> CollabFuture<'_, Result<ResolvedSource, SourceError>> {
        Box::pin(async move {
            let (delay, fail_index, missing) = {
                let s = self.settings.lock().unwrap();
                (s.delay, s.fail_index, s.missing)
            };
            if missing {
                return Err(SourceError::Unavailable("message deleted".into()));
            }
            Ok(ResolvedSource {
                source: Arc::new(SlowSource {
                    inner: FileRangeSource::new(&self.path),
                    delay,
                    fail_index,
                }),
                total_size: self.size,
                original_name: "source.bin".into(),
            })
        })
    }

    fn profile_photo(&self, _key: SessionKey) -> CollabFuture<'_, Option<ThumbnailRef>> {
        Box::pin(async move {
            self.settings
                .lock()
                .unwrap()
                .profile_photo
                .then(|| ThumbnailRef("photo-1".into()))
        })
    }

    fn download_thumbnail(
        &self,
        _thumb: ThumbnailRef,
        dest: PathBuf,
    ) -> CollabFuture<'_, Result<(), SourceError>> {
        Box::pin(async move {
            tokio::fs::write(&dest, b"raw image").await?;
            Ok(())
        })
    }
}

// --- publisher ---

#[derive(Default)]
pub(crate) struct FakePublisher {
    requests: Mutex<Vec<PublishRequest>>,
    bytes: Mutex<Vec<u8>>,
    thumbnail_present: Mutex<bool>,
    reject: Mutex<Option<String>>,
    hold: Mutex<Duration>,
}

impl FakePublisher {
    pub(crate) fn reject_with(&self, reason: &str) {
        *self.reject.lock().unwrap() = Some(reason.into());
    }

    pub(crate) fn hold(&self, duration: Duration) {
        *self.hold.lock().unwrap() = duration;
    }

    pub(crate) fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn last_request(&self) -> Option<PublishRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub(crate) fn last_published_bytes(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    pub(crate) fn had_thumbnail(&self) -> bool {
        *self.thumbnail_present.lock().unwrap()
    }
}

impl Publisher for FakePublisher {
    fn publish(
        &self,
        request: PublishRequest,
        on_progress: PublishProgress,
    ) -> CollabFuture<'_, Result<PublishedRef, PublishError>> {
        Box::pin(async move {
            let hold = *self.hold.lock().unwrap();
            if !hold.is_zero() {
                tokio::time::sleep(hold).await;
            }
            let reject = self.reject.lock().unwrap().clone();
            if let Some(reason) = reject {
                return Err(PublishError::Rejected(reason));
            }

            let data = tokio::fs::read(&request.path).await?;
            let len = data.len() as u64;
            on_progress(len / 2, len);
            on_progress(len, len);

            let has_thumb = request
                .metadata
                .thumbnail
                .as_ref()
                .is_some_and(|p| p.exists());
            *self.thumbnail_present.lock().unwrap() = has_thumb;
            *self.bytes.lock().unwrap() = data;

            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            Ok(PublishedRef {
                id: format!("published-{}", requests.len()),
            })
        })
    }
}

// --- preferences ---

#[derive(Default)]
pub(crate) struct FakePreferences {
    caption: Mutex<Option<String>>,
}

impl PreferenceStore for FakePreferences {
    fn saved_thumbnail(&self, _key: SessionKey) -> CollabFuture<'_, Option<ThumbnailRef>> {
        Box::pin(async { None })
    }

    fn caption_template(&self, _key: SessionKey) -> CollabFuture<'_, Option<String>> {
        Box::pin(async move { self.caption.lock().unwrap().clone() })
    }
}

// --- harness ---

/// A source file on disk plus a full set of mock collaborators.
pub(crate) struct Harness {
    dir: tempfile::TempDir,
    resolver: Arc<FakeResolver>,
    prefs: Arc<FakePreferences>,
    pub(crate) status: Arc<RecordingStatus>,
    pub(crate) publisher: Arc<FakePublisher>,
}

impl Harness {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.bin");
        std::fs::write(&path, &data).unwrap();

        Self {
            resolver: Arc::new(FakeResolver {
                path,
                size: data.len() as u64,
                settings: Mutex::new(ResolverSettings::default()),
            }),
            prefs: Arc::new(FakePreferences::default()),
            status: Arc::new(RecordingStatus::default()),
            publisher: Arc::new(FakePublisher::default()),
            dir,
        }
    }

    pub(crate) fn with_read_delay(self, delay: Duration) -> Self {
        self.resolver.settings.lock().unwrap().delay = delay;
        self
    }

    pub(crate) fn with_failing_source(self) -> Self {
        self.resolver.settings.lock().unwrap().fail_index = Some(3);
        self
    }

    pub(crate) fn with_missing_source(self) -> Self {
        self.resolver.settings.lock().unwrap().missing = true;
        self
    }

    pub(crate) fn with_profile_photo(self) -> Self {
        self.resolver.settings.lock().unwrap().profile_photo = true;
        self
    }

    pub(crate) fn with_caption(self, template: &str) -> Self {
        *self.prefs.caption.lock().unwrap() = Some(template.into());
        self
    }

    pub(crate) fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    pub(crate) fn workflow(&self) -> RenameWorkflow {
        self.workflow_with(|_| {})
    }

    pub(crate) fn workflow_with(&self, tweak: impl FnOnce(&mut WorkflowConfig)) -> RenameWorkflow {
        let mut config = WorkflowConfig {
            scratch_dir: self.scratch(),
            chunk_size: 1024,
            sub_chunk_size: 64 * 1024,
            progress_interval_ms: 250,
            stall_timeout_secs: 5,
            retry_backoff_ms: 1,
            ..WorkflowConfig::default()
        };
        tweak(&mut config);

        let collab = Collaborators {
            resolver: self.resolver.clone(),
            status: self.status.clone(),
            publisher: self.publisher.clone(),
            preferences: self.prefs.clone(),
            extractor: Arc::new(FakeExtractor::ok(MediaMetadata {
                width: Some(640),
                height: Some(360),
                duration_secs: Some(42),
            })),
            normalizer: Arc::new(FakeNormalizer::with_sizes(&[(85, 10_000)])),
        };
        RenameWorkflow::new(config, Arc::new(SessionStore::new()), collab)
    }
}
