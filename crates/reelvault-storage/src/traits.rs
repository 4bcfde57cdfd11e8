//! Storage abstraction trait
//!
//! This module defines the MediaStorage trait that all storage backends must implement.

use crate::reconcile::{ReconcileOptions, ReconcileReport};
use async_trait::async_trait;
use reelvault_core::{AssetId, AssetIdError, StorageBackend, StorageClass};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    /// Copied byte count differs from the source. The temp file is left in place.
    #[error("Size mismatch for {}: expected {expected} bytes, got {actual}", path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Operation not supported by the {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Invalid asset id: {0}")]
    InvalidAssetId(#[from] AssetIdError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Corruption is reported separately from every other failure.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StorageError::SizeMismatch { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Where a caller can read an asset from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "location", rename_all = "lowercase")]
pub enum MediaLocation {
    /// Path inside the local cache
    Local(PathBuf),
    /// Time-limited signed URL on the remote store
    Remote(String),
}

impl MediaLocation {
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            MediaLocation::Local(path) => Some(path),
            MediaLocation::Remote(_) => None,
        }
    }
}

impl Display for MediaLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaLocation::Local(path) => write!(f, "{}", path.display()),
            MediaLocation::Remote(url) => f.write_str(url),
        }
    }
}

/// Optional operations a backend can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// `list_all_videos`
    pub enumerate: bool,
    /// `delete_video`
    pub delete: bool,
}

/// Media storage trait
///
/// Every backend (local-only, caching remote) implements this trait and callers
/// hold an `Arc<dyn MediaStorage>`. Video and thumbnail are tracked independently;
/// a video without a thumbnail (or the reverse) is a valid state.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Store a new video from a temporary file produced by the fetcher.
    async fn write_video(&self, id: &AssetId, src_path: &Path) -> StorageResult<()>;

    /// Local path or remote URL for a video.
    ///
    /// With `force_download` a remote-only video is first promoted into the local
    /// cache, so the result is always `MediaLocation::Local`.
    async fn get_video_url(&self, id: &AssetId, force_download: bool)
        -> StorageResult<MediaLocation>;

    async fn video_status(&self, id: &AssetId) -> StorageResult<StorageClass>;

    /// Whether the video is served from local disk without promotion.
    async fn is_video_cached(&self, id: &AssetId) -> StorageResult<bool>;

    async fn write_thumbnail(&self, id: &AssetId, src_path: &Path) -> StorageResult<()>;

    async fn get_thumbnail_url(&self, id: &AssetId) -> StorageResult<MediaLocation>;

    async fn thumbnail_status(&self, id: &AssetId) -> StorageResult<StorageClass>;

    /// Remove both the video and its thumbnail.
    ///
    /// Only available when `capabilities().delete` is set.
    async fn delete_video(&self, id: &AssetId) -> StorageResult<()>;

    /// Enumerate every stored video.
    ///
    /// Only available when `capabilities().enumerate` is set. Order is unspecified.
    async fn list_all_videos(&self) -> StorageResult<Vec<AssetId>>;

    /// Converge the stores against the known and pinned sets.
    ///
    /// Individual anomalies are collected in the report; only failures that make
    /// the whole run meaningless (e.g. the remote listing cannot be fetched) are
    /// returned as errors.
    async fn integrity_check(
        &self,
        known: &BTreeSet<AssetId>,
        pinned: &BTreeSet<AssetId>,
        options: &ReconcileOptions,
    ) -> StorageResult<ReconcileReport>;

    fn capabilities(&self) -> Capabilities;

    /// Get the storage backend descriptor
    fn backend_type(&self) -> StorageBackend;
}
