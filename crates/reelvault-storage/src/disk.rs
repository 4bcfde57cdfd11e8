//! Sharded on-disk media tree.
//!
//! Both backends keep their local copies in the same layout (see [`crate::keys`]),
//! so the local-only store and the cache of the remote store are interchangeable
//! directories.

use crate::keys::{self, THUMBNAIL_DIR};
use crate::progress::ProgressSink;
use crate::transfer::{self, TransferReport};
use crate::traits::{StorageError, StorageResult};
use reelvault_core::{AssetId, AssetKind};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;

#[derive(Clone, Debug)]
pub struct MediaTree {
    root: PathBuf,
}

impl MediaTree {
    /// Open (and create if needed) a media tree rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create media directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(MediaTree { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, id: &AssetId, kind: AssetKind) -> PathBuf {
        keys::local_path(&self.root, id, kind)
    }

    /// Size of the local file, `None` if absent.
    pub async fn size(&self, id: &AssetId, kind: AssetKind) -> StorageResult<Option<u64>> {
        match fs::metadata(self.path(id, kind)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, id: &AssetId, kind: AssetKind) -> StorageResult<bool> {
        Ok(self.size(id, kind).await?.is_some())
    }

    /// Atomically copy `src` into place.
    pub async fn write(
        &self,
        id: &AssetId,
        kind: AssetKind,
        src: &Path,
        progress: &dyn ProgressSink,
    ) -> StorageResult<TransferReport> {
        let path = self.path(id, kind);
        let report = transfer::copy_atomic(src, &path, progress).await?;

        tracing::info!(
            asset_id = %id,
            kind = %kind,
            path = %path.display(),
            size_bytes = report.bytes,
            duration_ms = report.duration_ms(),
            "Local copy committed"
        );

        Ok(report)
    }

    /// Remove a local file. A missing file is an error.
    pub async fn remove(&self, id: &AssetId, kind: AssetKind) -> StorageResult<()> {
        let path = self.path(id, kind);

        fs::remove_file(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.display().to_string()),
            _ => StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            )),
        })?;

        tracing::info!(
            asset_id = %id,
            kind = %kind,
            path = %path.display(),
            "Local file removed"
        );

        Ok(())
    }

    /// Walk the two-level shard tree once and collect every committed video.
    ///
    /// Dot-files and anything without the video extension (including `.tmp`
    /// leftovers) are skipped.
    pub async fn list_videos(&self) -> StorageResult<Vec<AssetId>> {
        let start = Instant::now();
        let mut videos = Vec::new();

        let top_level: Vec<PathBuf> = subdirectories(&self.root)
            .await?
            .into_iter()
            .filter(|d| d.file_name().is_some_and(|n| n != THUMBNAIL_DIR))
            .collect();
        let top_count = top_level.len();

        for (idx, dir0) in top_level.into_iter().enumerate() {
            for dir1 in subdirectories(&dir0).await? {
                let mut entries = fs::read_dir(&dir1).await?;
                while let Some(entry) = entries.next_entry().await? {
                    if entry.file_type().await?.is_dir() {
                        continue;
                    }
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else {
                        continue;
                    };
                    if name.starts_with('.') {
                        continue;
                    }
                    if let Some((id, AssetKind::Video)) = AssetKind::parse_file_name(name) {
                        videos.push(id);
                    }
                }
            }

            tracing::debug!(
                directory = idx + 1,
                directories = top_count,
                items = videos.len(),
                "Enumerating directories"
            );
        }

        tracing::info!(
            root = %self.root.display(),
            count = videos.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Enumerated local videos"
        );

        Ok(videos)
    }
}

async fn subdirectories(path: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut entries = fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}
