//! Local file range source.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::plan::ByteRange;
use crate::source::{ByteStream, FetchError, RangeSource, SourceFuture};

/// Read buffer for local files (64 KB).
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Serves byte windows of a file on the local filesystem.
pub struct FileRangeSource {
    path: PathBuf,
}

impl FileRangeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RangeSource for FileRangeSource {
    fn fetch(&self, range: Option<ByteRange>) -> SourceFuture<'_, Result<ByteStream, FetchError>> {
        Box::pin(async move {
            let mut file = tokio::fs::File::open(&self.path).await?;
            let stream = match range {
                Some(r) => {
                    file.seek(SeekFrom::Start(r.start)).await?;
                    ReaderStream::with_capacity(file.take(r.len()), READ_BUFFER_SIZE)
                        .map(|chunk| chunk.map_err(FetchError::from))
                        .boxed()
                }
                None => ReaderStream::with_capacity(file, READ_BUFFER_SIZE)
                    .map(|chunk| chunk.map_err(FetchError::from))
                    .boxed(),
            };
            Ok(stream)
        })
    }

    fn probe_size(&self) -> SourceFuture<'_, Result<Option<u64>, FetchError>> {
        Box::pin(async move {
            let meta = tokio::fs::metadata(&self.path).await?;
            Ok(Some(meta.len()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<_> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn fetches_window_and_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let src = FileRangeSource::new(&path);
        assert_eq!(src.probe_size().await.unwrap(), Some(10));

        let window = ByteRange {
            index: 1,
            start: 3,
            end: 6,
        };
        assert_eq!(collect(src.fetch(Some(window)).await.unwrap()).await, b"3456");
        assert_eq!(collect(src.fetch(None).await.unwrap()).await, b"0123456789");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let src = FileRangeSource::new("/nonexistent/relayfile/src.bin");
        assert!(matches!(src.probe_size().await, Err(FetchError::Io(_))));
        assert!(matches!(src.fetch(None).await, Err(FetchError::Io(_))));
    }
}
