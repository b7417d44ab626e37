use std::path::{Path, PathBuf};

/// An inclusive byte window `[start, end]` of a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Position of this range in the plan.
    pub index: usize,
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by this window.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`; a window covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the same range with its first `skip` bytes removed.
    ///
    /// Used to resume a partially written range without re-fetching it.
    pub fn resume_from(&self, skip: u64) -> ByteRange {
        ByteRange {
            index: self.index,
            start: self.start + skip,
            end: self.end,
        }
    }

    /// Value for an HTTP `Range` header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} [{}-{}]", self.index, self.start, self.end)
    }
}

/// Splits `[0, total_size)` into `ceil(total_size / chunk_size)` contiguous
/// windows. The last window is truncated to the remaining bytes.
///
/// Returns an empty plan when either argument is zero.
pub fn partition(total_size: u64, chunk_size: u64) -> Vec<ByteRange> {
    if total_size == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let count = total_size.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = (start + chunk_size).min(total_size) - 1;
            ByteRange {
                index: i as usize,
                start,
                end,
            }
        })
        .collect()
}

/// The ranges and file locations for one transfer.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub total_size: u64,
    pub chunk_size: u64,
    pub ranges: Vec<ByteRange>,
    /// Final path, populated only after every range completed.
    pub destination: PathBuf,
    /// Pre-sized artifact the ranges write into.
    pub temp_path: PathBuf,
}

impl TransferPlan {
    pub fn new(total_size: u64, chunk_size: u64, destination: &Path) -> Self {
        Self {
            total_size,
            chunk_size,
            ranges: partition(total_size, chunk_size),
            destination: destination.to_path_buf(),
            temp_path: Self::temp_path_for(destination),
        }
    }

    /// Returns `<destination>.part`.
    pub fn temp_path_for(destination: &Path) -> PathBuf {
        let mut name = destination.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }
}
