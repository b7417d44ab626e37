//! Bounded-concurrency ranged transfer into a single artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fetcher::{FetchPolicy, RangeFetcher};
use crate::plan::{ByteRange, TransferPlan};
use crate::progress::{ProgressCallback, ProgressCounter, TransferProgress, spawn_reporter};
use crate::source::{FetchError, RangeSource};
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_SUB_CHUNK_SIZE, TransferError};

/// Tuning for [`TransferCoordinator`].
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Maximum ranges in flight at once.
    pub concurrency: usize,
    /// Width of each range in bytes.
    pub chunk_size: u64,
    /// Bytes buffered per positioned write inside a range.
    pub sub_chunk_size: usize,
    /// How often the progress callback fires.
    pub progress_interval: Duration,
    /// Longest silence tolerated from a range before it counts as failed.
    pub stall_timeout: Duration,
    /// Extra attempts per range, each resuming where the last one stopped.
    pub max_range_retries: u32,
    /// Delay before the first retry of a range.
    pub retry_backoff: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sub_chunk_size: DEFAULT_SUB_CHUNK_SIZE,
            progress_interval: Duration::from_millis(750),
            stall_timeout: Duration::from_secs(60),
            max_range_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl TransferOptions {
    fn validate(&self) -> Result<(), TransferError> {
        if self.concurrency == 0 {
            return Err(TransferError::InvalidOptions("concurrency must be >= 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidOptions("chunk size must be > 0".into()));
        }
        if self.sub_chunk_size == 0 {
            return Err(TransferError::InvalidOptions("sub-chunk size must be > 0".into()));
        }
        if self.progress_interval.is_zero() {
            return Err(TransferError::InvalidOptions(
                "progress interval must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            sub_chunk_size: self.sub_chunk_size,
            stall_timeout: self.stall_timeout,
            max_retries: self.max_range_retries,
            retry_backoff: self.retry_backoff,
        }
    }
}

/// Outcome of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Final artifact path.
    pub path: PathBuf,
    /// Bytes written.
    pub total_size: u64,
    /// Number of ranges fetched (1 for a whole-object fetch).
    pub ranges: usize,
    pub elapsed: Duration,
}

/// Runs ranged transfers.
pub struct TransferCoordinator {
    options: TransferOptions,
}

impl Default for TransferCoordinator {
    fn default() -> Self {
        Self::new(TransferOptions::default())
    }
}

impl TransferCoordinator {
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Transfers the object served by `source` to `destination`.
    ///
    /// Bytes land in `<destination>.part` first; the file is renamed into
    /// place only after every range wrote its full window. On any failure
    /// or cancellation the partial artifact is removed and nothing exists
    /// at `destination`.
    ///
    /// A `total_size` of 0 means unknown: the source is probed, and if it
    /// still cannot tell, the object is fetched in one request.
    pub async fn execute(
        &self,
        source: Arc<dyn RangeSource>,
        total_size: u64,
        destination: &Path,
        cancel: CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> Result<TransferReport, TransferError> {
        self.options.validate()?;

        let total_size = if total_size > 0 {
            total_size
        } else {
            match source.probe_size().await {
                Ok(Some(size)) => size,
                Ok(None) => 0,
                Err(e) => {
                    warn!(error = %e, "size probe failed, falling back to a single fetch");
                    0
                }
            }
        };

        let temp_path = TransferPlan::temp_path_for(destination);
        if let Some(parent) = temp_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = if total_size == 0 {
            self.fetch_whole(source, &temp_path, cancel, on_progress).await
        } else {
            let plan = TransferPlan::new(total_size, self.options.chunk_size, destination);
            self.fetch_ranged(source, &plan, cancel, on_progress).await
        };

        let (ranges, written, elapsed) = match result {
            Ok(done) => done,
            Err(e) => {
                discard(&temp_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&temp_path, destination).await {
            discard(&temp_path).await;
            return Err(e.into());
        }

        info!(
            path = %destination.display(),
            bytes = written,
            ranges,
            elapsed_ms = elapsed.as_millis() as u64,
            "transfer complete"
        );

        Ok(TransferReport {
            path: destination.to_path_buf(),
            total_size: written,
            ranges,
            elapsed,
        })
    }

    async fn fetch_ranged(
        &self,
        source: Arc<dyn RangeSource>,
        plan: &TransferPlan,
        cancel: CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> Result<(usize, u64, Duration), TransferError> {
        // Pre-size so concurrent positioned writes never grow the file.
        let file = tokio::fs::File::create(&plan.temp_path).await?;
        file.set_len(plan.total_size).await?;
        drop(file);

        debug!(
            total = plan.total_size,
            ranges = plan.ranges.len(),
            concurrency = self.options.concurrency,
            "starting ranged transfer"
        );

        let counter = Arc::new(ProgressCounter::new(plan.total_size));
        let started = Instant::now();
        let ranges_cancel = cancel.child_token();
        let reporter_stop = CancellationToken::new();
        let reporter = on_progress.as_ref().map(|cb| {
            spawn_reporter(
                Arc::clone(&counter),
                started,
                self.options.progress_interval,
                Arc::clone(cb),
                reporter_stop.clone(),
            )
        });

        let fetcher = RangeFetcher::new(
            source,
            plan.temp_path.clone(),
            Arc::clone(&counter),
            ranges_cancel.clone(),
            self.options.fetch_policy(),
        );
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut tasks = JoinSet::new();

        for range in plan.ranges.iter().copied() {
            let fetcher = fetcher.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = ranges_cancel.clone();
            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (range, Err(FetchError::Cancelled)),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return (range, Err(FetchError::Cancelled)),
                    },
                };
                (range, fetcher.run(range).await)
            });
        }

        let mut outcome: Result<(), TransferError> = Ok(());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = check_range(joined, &cancel) {
                outcome = Err(e);
                ranges_cancel.cancel();
                tasks.shutdown().await;
                break;
            }
        }

        reporter_stop.cancel();
        if let Some(handle) = reporter {
            let _ = handle.await;
        }
        outcome?;

        let written = counter.transferred();
        let on_disk = tokio::fs::metadata(&plan.temp_path).await?.len();
        if written != plan.total_size || on_disk != plan.total_size {
            return Err(TransferError::Incomplete {
                expected: plan.total_size,
                actual: written,
            });
        }

        if let Some(cb) = on_progress {
            cb(counter.snapshot(started));
        }
        Ok((plan.ranges.len(), written, started.elapsed()))
    }

    async fn fetch_whole(
        &self,
        source: Arc<dyn RangeSource>,
        temp_path: &Path,
        cancel: CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> Result<(usize, u64, Duration), TransferError> {
        tokio::fs::File::create(temp_path).await?;
        debug!("size unknown, fetching whole object");

        let counter = Arc::new(ProgressCounter::new(0));
        let started = Instant::now();
        let reporter_stop = CancellationToken::new();
        let reporter = on_progress.as_ref().map(|cb| {
            spawn_reporter(
                Arc::clone(&counter),
                started,
                self.options.progress_interval,
                Arc::clone(cb),
                reporter_stop.clone(),
            )
        });
        let fetcher = RangeFetcher::new(
            source,
            temp_path.to_path_buf(),
            Arc::clone(&counter),
            cancel,
            self.options.fetch_policy(),
        );

        let result = fetcher.run_whole().await;
        reporter_stop.cancel();
        if let Some(handle) = reporter {
            let _ = handle.await;
        }
        let written = match result {
            Ok(n) => n,
            Err(FetchError::Cancelled) => return Err(TransferError::Cancelled),
            Err(e) => return Err(e.into()),
        };

        if let Some(cb) = on_progress {
            cb(TransferProgress::new(written, written, started.elapsed()));
        }
        Ok((1, written, started.elapsed()))
    }
}

/// Turns one finished range task into an error if it did not write its
/// whole window.
fn check_range(
    joined: Result<(ByteRange, Result<u64, FetchError>), tokio::task::JoinError>,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let (range, result) = joined?;
    match result {
        Ok(received) if received == range.len() => Ok(()),
        Ok(received) => Err(TransferError::Incomplete {
            expected: range.len(),
            actual: received,
        }),
        Err(FetchError::Cancelled) => Err(TransferError::Cancelled),
        Err(_) if cancel.is_cancelled() => Err(TransferError::Cancelled),
        Err(source) => Err(TransferError::Range {
            index: range.index,
            start: range.start,
            end: range.end,
            source,
        }),
    }
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial artifact"),
    }
}
