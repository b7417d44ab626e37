//! The seam between the transfer engine and whatever serves the bytes.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::plan::ByteRange;

/// Body of one fetch, delivered in arbitrarily sized pieces.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Boxed future returned by [`RangeSource`] methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from fetching a single range.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {range}")]
    Status { status: u16, range: String },

    #[error("no data received for {0:?}")]
    Stalled(Duration),

    #[error("body ended after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("body exceeded the requested {expected} bytes")]
    Overflow { expected: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source error: {0}")]
    Source(String),

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt at the same range may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(_)
            | FetchError::Stalled(_)
            | FetchError::Truncated { .. }
            | FetchError::Io(_)
            | FetchError::Source(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Overflow { .. } | FetchError::Cancelled => false,
        }
    }
}

/// Something that can serve byte windows of one remote object.
///
/// Implemented over HTTP by [`HttpRangeSource`](crate::HttpRangeSource) and
/// over local files by [`FileRangeSource`](crate::FileRangeSource). Using a
/// trait keeps the coordinator testable with in-memory sources.
pub trait RangeSource: Send + Sync {
    /// Opens a body for `range`, or for the whole object when `None`.
    fn fetch(&self, range: Option<ByteRange>) -> SourceFuture<'_, Result<ByteStream, FetchError>>;

    /// Asks the source for the object size without fetching it.
    ///
    /// Returns `Ok(None)` when the source cannot tell.
    fn probe_size(&self) -> SourceFuture<'_, Result<Option<u64>, FetchError>>;
}
