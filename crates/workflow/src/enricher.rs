//! Duration, dimensions and thumbnail for a published artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relayfile_session::MediaKind;
use tracing::{debug, warn};

use crate::collaborators::{ExtractError, ImageNormalizer, MetadataExtractor};
use crate::types::{EnrichedMetadata, MediaMetadata};

/// Thumbnail encoding budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSettings {
    /// Longest side in pixels.
    pub max_side: u32,
    /// Size above which the fallback quality pass runs.
    pub max_bytes: u64,
    pub quality: u8,
    pub fallback_quality: u8,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            max_side: 320,
            max_bytes: 200_000,
            quality: 85,
            fallback_quality: 70,
        }
    }
}

/// Derives presentation metadata through the extractor and normalizer.
///
/// Nothing here fails the workflow: every collaborator error degrades to
/// an absent field.
pub struct MetadataEnricher {
    extractor: Arc<dyn MetadataExtractor>,
    normalizer: Arc<dyn ImageNormalizer>,
    settings: ThumbnailSettings,
}

impl MetadataEnricher {
    pub fn new(
        extractor: Arc<dyn MetadataExtractor>,
        normalizer: Arc<dyn ImageNormalizer>,
        settings: ThumbnailSettings,
    ) -> Self {
        Self {
            extractor,
            normalizer,
            settings,
        }
    }

    /// Enriches `artifact` for publishing as `kind`.
    ///
    /// When `thumbnail_source` is given, the normalized thumbnail is
    /// written to `thumbnail_dest`.
    pub async fn enrich(
        &self,
        artifact: &Path,
        kind: MediaKind,
        thumbnail_source: Option<&Path>,
        thumbnail_dest: &Path,
    ) -> EnrichedMetadata {
        let media = if kind.has_media_metadata() {
            self.extract(artifact).await
        } else {
            MediaMetadata::default()
        };

        let thumbnail = match thumbnail_source {
            Some(src) => self.thumbnail(src, thumbnail_dest).await,
            None => None,
        };

        // Audio only carries a duration.
        let (width, height) = match kind {
            MediaKind::Video => (media.width, media.height),
            _ => (None, None),
        };

        EnrichedMetadata {
            width,
            height,
            duration_secs: media.duration_secs,
            thumbnail,
        }
    }

    async fn extract(&self, artifact: &Path) -> MediaMetadata {
        let extractor = Arc::clone(&self.extractor);
        let path = artifact.to_path_buf();
        match tokio::task::spawn_blocking(move || extractor.extract(&path)).await {
            Ok(Ok(meta)) => meta,
            Ok(Err(e)) => {
                warn!(path = %artifact.display(), error = %e, "metadata extraction failed");
                MediaMetadata::default()
            }
            Err(e) => {
                warn!(error = %e, "metadata extraction task failed");
                MediaMetadata::default()
            }
        }
    }

    async fn thumbnail(&self, src: &Path, dest: &Path) -> Option<PathBuf> {
        let first = self.normalize(src, dest, self.settings.quality).await;
        let size = match first {
            Ok(size) => size,
            Err(e) => {
                warn!(src = %src.display(), error = %e, "thumbnail normalization failed");
                discard(dest).await;
                return None;
            }
        };

        if size > self.settings.max_bytes {
            debug!(
                size,
                quality = self.settings.fallback_quality,
                "thumbnail over budget, re-encoding"
            );
            if let Err(e) = self.normalize(src, dest, self.settings.fallback_quality).await {
                warn!(src = %src.display(), error = %e, "thumbnail re-encode failed");
                discard(dest).await;
                return None;
            }
        }
        Some(dest.to_path_buf())
    }

    async fn normalize(&self, src: &Path, dest: &Path, quality: u8) -> Result<u64, ExtractError> {
        let normalizer = Arc::clone(&self.normalizer);
        let (src, dest) = (src.to_path_buf(), dest.to_path_buf());
        let max_side = self.settings.max_side;
        tokio::task::spawn_blocking(move || normalizer.normalize(&src, &dest, max_side, quality))
            .await
            .map_err(|e| ExtractError::Failed(e.to_string()))?
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "failed to remove thumbnail");
        }
    }
}
