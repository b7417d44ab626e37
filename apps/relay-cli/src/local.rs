//! Collaborators backed by the local filesystem and the terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relayfile_session::{SessionKey, SourceHandle};
use relayfile_transfer::FileRangeSource;
use relayfile_workflow::{
    CollabFuture, Collaborators, ExtractError, ImageNormalizer, MediaMetadata,
    MediaSourceResolver, MetadataExtractor, PreferenceStore, PublishError, PublishProgress,
    PublishRequest, PublishedRef, Publisher, ResolvedSource, SourceError, StatusError, StatusSink,
    ThumbnailRef,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

/// Copy buffer for the directory publisher (1 MiB).
const PUBLISH_BUFFER_SIZE: usize = 1024 * 1024;

/// Serves one local file as the source of every session.
pub struct LocalResolver {
    path: PathBuf,
}

impl LocalResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MediaSourceResolver for LocalResolver {
    fn resolve(&self, _source: SourceHandle) -> CollabFuture<'_, Result<ResolvedSource, SourceError>> {
        Box::pin(async move {
            let meta = match tokio::fs::metadata(&self.path).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SourceError::Unavailable(self.path.display().to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            Ok(ResolvedSource {
                source: Arc::new(FileRangeSource::new(&self.path)),
                total_size: meta.len(),
                original_name: file_name(&self.path),
            })
        })
    }

    fn profile_photo(&self, _key: SessionKey) -> CollabFuture<'_, Option<ThumbnailRef>> {
        Box::pin(async { None })
    }

    fn download_thumbnail(
        &self,
        thumb: ThumbnailRef,
        dest: PathBuf,
    ) -> CollabFuture<'_, Result<(), SourceError>> {
        // Thumbnail refs are plain paths here.
        Box::pin(async move {
            tokio::fs::copy(&thumb.0, &dest).await?;
            Ok(())
        })
    }
}

/// Prints status updates to stderr, one line per update.
pub struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn update_status(&self, _key: SessionKey, text: String) -> CollabFuture<'_, Result<(), StatusError>> {
        Box::pin(async move {
            let line: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
            eprintln!("{}", line.join(" | "));
            Ok(())
        })
    }
}

/// Publishes by copying the artifact into a directory.
pub struct DirectoryPublisher {
    out_dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl Publisher for DirectoryPublisher {
    fn publish(
        &self,
        request: PublishRequest,
        on_progress: PublishProgress,
    ) -> CollabFuture<'_, Result<PublishedRef, PublishError>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.out_dir).await?;
            let dest = self.out_dir.join(&request.name);

            let mut src = tokio::fs::File::open(&request.path).await?;
            let total = src.metadata().await?.len();
            let mut out = tokio::fs::File::create(&dest).await?;
            let mut buf = vec![0u8; PUBLISH_BUFFER_SIZE];
            let mut sent = 0u64;

            loop {
                let n = src.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).await?;
                sent += n as u64;
                on_progress(sent, total);
            }
            out.flush().await?;

            info!(
                path = %dest.display(),
                kind = %request.kind,
                caption = %request.caption,
                duration = ?request.metadata.duration_secs,
                "published"
            );
            Ok(PublishedRef {
                id: dest.display().to_string(),
            })
        })
    }
}

/// Fixed preferences taken from the command line.
pub struct StaticPreferences {
    pub caption: Option<String>,
    pub thumbnail: Option<PathBuf>,
}

impl PreferenceStore for StaticPreferences {
    fn saved_thumbnail(&self, _key: SessionKey) -> CollabFuture<'_, Option<ThumbnailRef>> {
        let thumb = self
            .thumbnail
            .as_ref()
            .map(|p| ThumbnailRef(p.display().to_string()));
        Box::pin(async move { thumb })
    }

    fn caption_template(&self, _key: SessionKey) -> CollabFuture<'_, Option<String>> {
        let caption = self.caption.clone();
        Box::pin(async move { caption })
    }
}

/// No media tooling is bundled; enrichment degrades to absent fields.
pub struct NoMediaTools;

impl MetadataExtractor for NoMediaTools {
    fn extract(&self, _path: &Path) -> Result<MediaMetadata, ExtractError> {
        Err(ExtractError::Unsupported)
    }
}

impl ImageNormalizer for NoMediaTools {
    fn normalize(
        &self,
        _src: &Path,
        _dest: &Path,
        _max_side: u32,
        _quality: u8,
    ) -> Result<u64, ExtractError> {
        Err(ExtractError::Unsupported)
    }
}

/// Builds the local collaborator set for one input file.
pub fn collaborators(
    input: &Path,
    out_dir: &Path,
    caption: Option<String>,
    thumbnail: Option<PathBuf>,
) -> Collaborators {
    let tools = Arc::new(NoMediaTools);
    Collaborators {
        resolver: Arc::new(LocalResolver::new(input)),
        status: Arc::new(ConsoleStatus),
        publisher: Arc::new(DirectoryPublisher::new(out_dir)),
        preferences: Arc::new(StaticPreferences { caption, thumbnail }),
        extractor: tools.clone(),
        normalizer: tools,
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".into())
}
