//! Parallel ranged transfer with bounded concurrency and progress tracking.
//!
//! A remote object of known size is split into fixed-width byte ranges
//! ([`partition`]). Each range is fetched by its own [`RangeFetcher`] and
//! written at its offset into one pre-sized temp artifact, so ranges may
//! complete in any order. [`TransferCoordinator`] bounds the number of
//! in-flight fetches, aggregates progress into a single counter, and only
//! renames the temp artifact into place once every byte has arrived.

mod coordinator;
mod fetcher;
mod file;
mod http;
mod plan;
mod progress;
mod source;
#[cfg(test)]
mod testing;

pub use coordinator::{TransferCoordinator, TransferOptions, TransferReport};
pub use fetcher::{FetchPolicy, RangeFetcher};
pub use file::FileRangeSource;
pub use http::HttpRangeSource;
pub use plan::{ByteRange, TransferPlan, partition};
pub use progress::{ProgressCallback, ProgressCounter, TransferProgress};
pub use source::{ByteStream, FetchError, RangeSource, SourceFuture};

/// Default range width: 8 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Default write granularity inside one range: 512 KiB.
pub const DEFAULT_SUB_CHUNK_SIZE: usize = 512 * 1024;

/// Default number of ranges fetched at the same time.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid transfer options: {0}")]
    InvalidOptions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {index} (bytes {start}-{end}) failed: {source}")]
    Range {
        index: usize,
        start: u64,
        end: u64,
        #[source]
        source: FetchError,
    },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("incomplete transfer: expected {expected} bytes, got {actual}")]
    Incomplete { expected: u64, actual: u64 },

    #[error("range task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("cancelled")]
    Cancelled,
}
