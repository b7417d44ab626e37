//! Fetches one byte range into its offset of the destination artifact.

use std::future::Future;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::plan::ByteRange;
use crate::progress::ProgressCounter;
use crate::source::{FetchError, RangeSource};

/// Per-range behavior knobs.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Bytes buffered before each positioned write.
    pub sub_chunk_size: usize,
    /// Longest wait for the response or for the next piece of the body.
    pub stall_timeout: Duration,
    /// Extra attempts after the first failure of a range.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further attempt.
    pub retry_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            sub_chunk_size: crate::DEFAULT_SUB_CHUNK_SIZE,
            stall_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl FetchPolicy {
    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(1 << exp)
    }
}

/// Writes one range (or the whole object) into a pre-sized file.
///
/// The fetcher owns only its window of the file: it opens its own handle,
/// seeks to its offset, and never writes outside `[start, end]`.
#[derive(Clone)]
pub struct RangeFetcher {
    source: Arc<dyn RangeSource>,
    path: PathBuf,
    counter: Arc<ProgressCounter>,
    cancel: CancellationToken,
    policy: FetchPolicy,
}

impl RangeFetcher {
    pub fn new(
        source: Arc<dyn RangeSource>,
        path: PathBuf,
        counter: Arc<ProgressCounter>,
        cancel: CancellationToken,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            source,
            path,
            counter,
            cancel,
            policy,
        }
    }

    /// Fetches `range` with retries, resuming from the last written byte.
    ///
    /// Returns the number of bytes written, which equals `range.len()`.
    pub async fn run(&self, range: ByteRange) -> Result<u64, FetchError> {
        let mut written = 0u64;
        let mut attempt = 0u32;

        loop {
            match self.attempt(range, &mut written).await {
                Ok(()) => {
                    debug!(range = %range, bytes = written, attempts = attempt + 1, "range complete");
                    return Ok(written);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        range = %range,
                        attempt,
                        resume_at = range.start + written,
                        error = %e,
                        "range fetch failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Streams the whole object from offset 0 in a single request.
    ///
    /// Used when the size is unknown, so there is nothing to resume against
    /// and no retry. Returns the number of bytes written.
    pub async fn run_whole(&self) -> Result<u64, FetchError> {
        let mut stream = self.guarded(self.source.fetch(None)).await??;
        let mut file = tokio::fs::OpenOptions::new().write(true).open(&self.path).await?;
        let mut buf = Vec::with_capacity(self.policy.sub_chunk_size);
        let mut written = 0u64;

        while let Some(piece) = self.guarded(stream.next()).await? {
            buf.extend_from_slice(&piece?);
            if buf.len() >= self.policy.sub_chunk_size {
                self.flush(&mut file, &mut buf, &mut written).await?;
            }
        }
        self.flush(&mut file, &mut buf, &mut written).await?;
        file.flush().await?;
        Ok(written)
    }

    /// One request for the not-yet-written tail of `range`.
    async fn attempt(&self, range: ByteRange, written: &mut u64) -> Result<(), FetchError> {
        let window = range.resume_from(*written);
        let mut stream = self.guarded(self.source.fetch(Some(window))).await??;

        let mut file = tokio::fs::OpenOptions::new().write(true).open(&self.path).await?;
        file.seek(SeekFrom::Start(window.start)).await?;

        let expected = range.len();
        let mut buf = Vec::with_capacity(self.policy.sub_chunk_size);

        while let Some(piece) = self.guarded(stream.next()).await? {
            let piece = piece?;
            if *written + (buf.len() + piece.len()) as u64 > expected {
                return Err(FetchError::Overflow { expected });
            }
            buf.extend_from_slice(&piece);
            if buf.len() >= self.policy.sub_chunk_size {
                self.flush(&mut file, &mut buf, written).await?;
            }
        }
        self.flush(&mut file, &mut buf, written).await?;
        file.flush().await?;

        if *written < expected {
            return Err(FetchError::Truncated {
                expected,
                received: *written,
            });
        }
        Ok(())
    }

    /// Writes the buffered sub-chunk at the current position and counts it.
    async fn flush(
        &self,
        file: &mut File,
        buf: &mut Vec<u8>,
        written: &mut u64,
    ) -> Result<(), FetchError> {
        if buf.is_empty() {
            return Ok(());
        }
        file.write_all(buf).await?;
        let n = buf.len() as u64;
        *written += n;
        self.counter.add(n);
        buf.clear();
        Ok(())
    }

    /// Races `fut` against cancellation and the stall timeout.
    async fn guarded<T>(&self, fut: impl Future<Output = T>) -> Result<T, FetchError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            res = tokio::time::timeout(self.policy.stall_timeout, fut) => {
                res.map_err(|_| FetchError::Stalled(self.policy.stall_timeout))
            }
        }
    }
}
