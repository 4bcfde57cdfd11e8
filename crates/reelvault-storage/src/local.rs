use crate::disk::MediaTree;
use crate::progress::LogProgress;
use crate::reconcile::{self, ReconcileOptions, ReconcileReport};
use crate::traits::{Capabilities, MediaLocation, MediaStorage, StorageResult};
use async_trait::async_trait;
use reelvault_core::{AssetId, AssetKind, StorageBackend, StorageClass};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Local filesystem storage implementation
///
/// Every asset lives permanently in a sharded tree on local disk; there is no
/// remote tier, so nothing is ever evicted.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    tree: MediaTree,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `root` - Root directory of the media tree (e.g., "/srv/reelvault/media")
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        Ok(LocalStorage {
            tree: MediaTree::open(root).await?,
        })
    }

    pub fn root(&self) -> &Path {
        self.tree.root()
    }

    async fn write(&self, id: &AssetId, kind: AssetKind, src_path: &Path) -> StorageResult<()> {
        let progress = LogProgress::for_file("store", id.as_str(), src_path).await?;
        self.tree.write(id, kind, src_path, &progress).await?;
        Ok(())
    }

    async fn status(&self, id: &AssetId, kind: AssetKind) -> StorageResult<StorageClass> {
        let local = self.tree.exists(id, kind).await?;
        Ok(StorageClass::from_presence(local, false))
    }
}

#[async_trait]
impl MediaStorage for LocalStorage {
    async fn write_video(&self, id: &AssetId, src_path: &Path) -> StorageResult<()> {
        self.write(id, AssetKind::Video, src_path).await
    }

    async fn get_video_url(
        &self,
        id: &AssetId,
        _force_download: bool,
    ) -> StorageResult<MediaLocation> {
        Ok(MediaLocation::Local(self.tree.path(id, AssetKind::Video)))
    }

    async fn video_status(&self, id: &AssetId) -> StorageResult<StorageClass> {
        self.status(id, AssetKind::Video).await
    }

    async fn is_video_cached(&self, id: &AssetId) -> StorageResult<bool> {
        self.tree.exists(id, AssetKind::Video).await
    }

    async fn write_thumbnail(&self, id: &AssetId, src_path: &Path) -> StorageResult<()> {
        self.write(id, AssetKind::Thumbnail, src_path).await
    }

    async fn get_thumbnail_url(&self, id: &AssetId) -> StorageResult<MediaLocation> {
        Ok(MediaLocation::Local(self.tree.path(id, AssetKind::Thumbnail)))
    }

    async fn thumbnail_status(&self, id: &AssetId) -> StorageResult<StorageClass> {
        self.status(id, AssetKind::Thumbnail).await
    }

    async fn delete_video(&self, id: &AssetId) -> StorageResult<()> {
        self.tree.remove(id, AssetKind::Video).await?;
        self.tree.remove(id, AssetKind::Thumbnail).await
    }

    async fn list_all_videos(&self) -> StorageResult<Vec<AssetId>> {
        self.tree.list_videos().await
    }

    async fn integrity_check(
        &self,
        known: &BTreeSet<AssetId>,
        pinned: &BTreeSet<AssetId>,
        _options: &ReconcileOptions,
    ) -> StorageResult<ReconcileReport> {
        reconcile::check_local(&self.tree, known, pinned).await
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            enumerate: true,
            delete: true,
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local {
            root: self.tree.root().to_path_buf(),
        }
    }
}
