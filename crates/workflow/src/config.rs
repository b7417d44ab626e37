//! Workflow configuration.

use std::path::PathBuf;
use std::time::Duration;

use relayfile_transfer::TransferOptions;
use serde::{Deserialize, Serialize};

use crate::enricher::ThumbnailSettings;

/// Where the publish thumbnail comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailPolicy {
    /// Only the thumbnail the user saved in their preferences.
    Saved,
    /// The saved thumbnail, else the chat's profile photo.
    #[default]
    SavedOrProfilePhoto,
    /// Never attach a thumbnail.
    Disabled,
}

/// Tuning for [`RenameWorkflow`](crate::RenameWorkflow).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Root of the per-session scratch directories.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Ranges fetched at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Range width in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    #[serde(default = "default_sub_chunk_size")]
    pub sub_chunk_size: usize,

    /// Interval between progress status edits, in milliseconds.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    #[serde(default = "default_max_range_retries")]
    pub max_range_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Idle time after which a session waiting for input is dropped.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub thumbnail_policy: ThumbnailPolicy,

    #[serde(default = "default_thumbnail_max_side")]
    pub thumbnail_max_side: u32,

    #[serde(default = "default_thumbnail_max_bytes")]
    pub thumbnail_max_bytes: u64,

    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,

    #[serde(default = "default_thumbnail_fallback_quality")]
    pub thumbnail_fallback_quality: u8,

    /// Caption used when the user has no template of their own.
    #[serde(default = "default_caption")]
    pub default_caption: String,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("relayfile")
}

fn default_concurrency() -> usize {
    relayfile_transfer::DEFAULT_CONCURRENCY
}

fn default_chunk_size() -> u64 {
    relayfile_transfer::DEFAULT_CHUNK_SIZE
}

fn default_sub_chunk_size() -> usize {
    relayfile_transfer::DEFAULT_SUB_CHUNK_SIZE
}

fn default_progress_interval_ms() -> u64 {
    750
}

fn default_stall_timeout_secs() -> u64 {
    60
}

fn default_max_range_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_session_timeout_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_thumbnail_max_side() -> u32 {
    320
}

fn default_thumbnail_max_bytes() -> u64 {
    200_000
}

fn default_thumbnail_quality() -> u8 {
    85
}

fn default_thumbnail_fallback_quality() -> u8 {
    70
}

fn default_caption() -> String {
    "{filename}".into()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            sub_chunk_size: default_sub_chunk_size(),
            progress_interval_ms: default_progress_interval_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
            max_range_retries: default_max_range_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            session_timeout_secs: default_session_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            thumbnail_policy: ThumbnailPolicy::default(),
            thumbnail_max_side: default_thumbnail_max_side(),
            thumbnail_max_bytes: default_thumbnail_max_bytes(),
            thumbnail_quality: default_thumbnail_quality(),
            thumbnail_fallback_quality: default_thumbnail_fallback_quality(),
            default_caption: default_caption(),
        }
    }
}

impl WorkflowConfig {
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            concurrency: self.concurrency,
            chunk_size: self.chunk_size,
            sub_chunk_size: self.sub_chunk_size,
            progress_interval: self.progress_interval(),
            stall_timeout: self.stall_timeout(),
            max_range_retries: self.max_range_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn thumbnail_settings(&self) -> ThumbnailSettings {
        ThumbnailSettings {
            max_side: self.thumbnail_max_side,
            max_bytes: self.thumbnail_max_bytes,
            quality: self.thumbnail_quality,
            fallback_quality: self.thumbnail_fallback_quality,
        }
    }

    /// Never shorter than 1 ms.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Never shorter than 1 s.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Never shorter than 1 s; a zero timeout would fail every read.
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs.max(1))
    }
}
