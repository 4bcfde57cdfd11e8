use crate::disk::MediaTree;
use crate::progress::LogProgress;
use crate::reconcile::{ReconcileOptions, ReconcileReport, Reconciler};
use crate::remote::{RemoteSettings, RemoteStore};
use crate::traits::{Capabilities, MediaLocation, MediaStorage, StorageError, StorageResult};
use async_trait::async_trait;
use reelvault_core::{AssetId, AssetKind, StorageBackend, StorageClass};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// S3 storage with a local cache
///
/// The bucket holds every asset; the cache tree holds pinned videos, thumbnails
/// and anything written recently. Cache hits are served as local paths, misses
/// as presigned URLs.
#[derive(Clone)]
pub struct S3Storage {
    cache: MediaTree,
    remote: RemoteStore,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `cache_root` - Local cache directory, laid out like the local backend
    /// * `settings` - Bucket, prefix, region and optional endpoint for S3-compatible
    ///   providers (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        cache_root: impl Into<PathBuf>,
        settings: &RemoteSettings,
    ) -> StorageResult<Self> {
        let remote = RemoteStore::s3(settings)?;
        Self::with_remote(cache_root, remote).await
    }

    pub async fn with_remote(
        cache_root: impl Into<PathBuf>,
        remote: RemoteStore,
    ) -> StorageResult<Self> {
        let cache = MediaTree::open(cache_root).await?;

        tracing::info!(
            bucket = %remote.bucket(),
            prefix = %remote.prefix(),
            cache = %cache.root().display(),
            "S3 storage initialized"
        );

        Ok(S3Storage { cache, remote })
    }

    pub fn cache_root(&self) -> &Path {
        self.cache.root()
    }

    /// Cache first, then back the cached copy up to the bucket.
    ///
    /// If the upload fails the cached copy stays and the next integrity check
    /// retries it.
    async fn write(&self, id: &AssetId, kind: AssetKind, src_path: &Path) -> StorageResult<()> {
        let progress = LogProgress::for_file("store", id.as_str(), src_path).await?;
        let report = self.cache.write(id, kind, src_path, &progress).await?;

        let cached = self.cache.path(id, kind);
        let progress = LogProgress::new("upload", id.as_str(), report.bytes);
        self.remote.upload(id, kind, &cached, &progress).await?;
        Ok(())
    }

    async fn status(&self, id: &AssetId, kind: AssetKind) -> StorageResult<StorageClass> {
        if self.cache.exists(id, kind).await? {
            return Ok(StorageClass::Local);
        }
        let remote = self.remote.exists(id, kind).await?;
        Ok(StorageClass::from_presence(false, remote))
    }

    async fn promote(&self, id: &AssetId) -> StorageResult<PathBuf> {
        let size = self
            .remote
            .head(id, AssetKind::Video)
            .await?
            .ok_or_else(|| StorageError::NotFound(self.remote.key(id, AssetKind::Video)))?;

        let path = self.cache.path(id, AssetKind::Video);
        let progress = LogProgress::new("download", id.as_str(), size);
        self.remote
            .download(id, AssetKind::Video, &path, &progress)
            .await?;
        Ok(path)
    }
}

#[async_trait]
impl MediaStorage for S3Storage {
    async fn write_video(&self, id: &AssetId, src_path: &Path) -> StorageResult<()> {
        self.write(id, AssetKind::Video, src_path).await
    }

    async fn get_video_url(
        &self,
        id: &AssetId,
        force_download: bool,
    ) -> StorageResult<MediaLocation> {
        if self.cache.exists(id, AssetKind::Video).await? {
            return Ok(MediaLocation::Local(self.cache.path(id, AssetKind::Video)));
        }

        if force_download {
            tracing::info!(asset_id = %id, "Promoting video into cache");
            return Ok(MediaLocation::Local(self.promote(id).await?));
        }

        Ok(MediaLocation::Remote(
            self.remote.presigned_url(id, AssetKind::Video).await?,
        ))
    }

    async fn video_status(&self, id: &AssetId) -> StorageResult<StorageClass> {
        self.status(id, AssetKind::Video).await
    }

    async fn is_video_cached(&self, id: &AssetId) -> StorageResult<bool> {
        self.cache.exists(id, AssetKind::Video).await
    }

    async fn write_thumbnail(&self, id: &AssetId, src_path: &Path) -> StorageResult<()> {
        self.write(id, AssetKind::Thumbnail, src_path).await
    }

    async fn get_thumbnail_url(&self, id: &AssetId) -> StorageResult<MediaLocation> {
        if self.cache.exists(id, AssetKind::Thumbnail).await? {
            return Ok(MediaLocation::Local(
                self.cache.path(id, AssetKind::Thumbnail),
            ));
        }

        Ok(MediaLocation::Remote(
            self.remote.presigned_url(id, AssetKind::Thumbnail).await?,
        ))
    }

    async fn thumbnail_status(&self, id: &AssetId) -> StorageResult<StorageClass> {
        self.status(id, AssetKind::Thumbnail).await
    }

    async fn delete_video(&self, _id: &AssetId) -> StorageResult<()> {
        Err(StorageError::Unsupported {
            backend: "s3",
            operation: "delete_video",
        })
    }

    async fn list_all_videos(&self) -> StorageResult<Vec<AssetId>> {
        Err(StorageError::Unsupported {
            backend: "s3",
            operation: "list_all_videos",
        })
    }

    async fn integrity_check(
        &self,
        known: &BTreeSet<AssetId>,
        pinned: &BTreeSet<AssetId>,
        options: &ReconcileOptions,
    ) -> StorageResult<ReconcileReport> {
        Reconciler::new(&self.cache, &self.remote)
            .run(known, pinned, options)
            .await
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            enumerate: false,
            delete: false,
        }
    }

    fn backend_type(&self) -> StorageBackend {
        let prefix = self.remote.prefix().trim_end_matches('/');
        StorageBackend::S3 {
            bucket: self.remote.bucket().to_string(),
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::test_support::{
        memory_remote, object_size, put_object, unreachable_remote, TEST_BUCKET,
    };
    use object_store::memory::InMemory;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tokio::fs;

    fn id(raw: &str) -> AssetId {
        raw.parse().unwrap()
    }

    async fn caching_storage(prefix: Option<&str>) -> (S3Storage, Arc<InMemory>, TempDir) {
        let dir = tempdir().unwrap();
        let (remote, memory) = memory_remote(prefix);
        let storage = S3Storage::with_remote(dir.path().join("cache"), remote)
            .await
            .unwrap();
        (storage, memory, dir)
    }

    #[tokio::test]
    async fn write_caches_and_uploads() {
        let (storage, memory, dir) = caching_storage(Some("media")).await;
        let src = dir.path().join("fetched.mkv");
        fs::write(&src, b"fresh video").await.unwrap();

        let vid = id("dQw4w9WgXcQ");
        storage.write_video(&vid, &src).await.unwrap();

        assert!(storage.is_video_cached(&vid).await.unwrap());
        assert_eq!(storage.video_status(&vid).await.unwrap(), StorageClass::Local);
        assert_eq!(object_size(&memory, "media/dQw4w9WgXcQ.mkv").await, Some(11));
        assert_eq!(
            storage.thumbnail_status(&vid).await.unwrap(),
            StorageClass::Offline
        );
    }

    #[tokio::test]
    async fn status_reflects_remote_only_copy() {
        let (storage, memory, _dir) = caching_storage(None).await;
        let vid = id("dQw4w9WgXcQ");
        put_object(&memory, "dQw4w9WgXcQ.mkv", b"abc").await;

        assert_eq!(storage.video_status(&vid).await.unwrap(), StorageClass::Remote);
        assert!(!storage.is_video_cached(&vid).await.unwrap());
    }

    #[tokio::test]
    async fn uncached_video_url_is_presigned() {
        let (storage, memory, _dir) = caching_storage(Some("media")).await;
        let vid = id("dQw4w9WgXcQ");
        put_object(&memory, "media/dQw4w9WgXcQ.mkv", b"abc").await;

        let location = storage.get_video_url(&vid, false).await.unwrap();
        match location {
            MediaLocation::Remote(url) => {
                assert!(url.contains(TEST_BUCKET));
                assert!(url.contains("media/dQw4w9WgXcQ.mkv"));
            }
            other => panic!("expected a presigned url, got {other:?}"),
        }
        // Presigning moves no bytes.
        assert!(!storage.is_video_cached(&vid).await.unwrap());
    }

    #[tokio::test]
    async fn forced_download_promotes_into_cache() {
        let (storage, memory, _dir) = caching_storage(None).await;
        let vid = id("dQw4w9WgXcQ");
        put_object(&memory, "dQw4w9WgXcQ.mkv", b"remote bytes").await;

        let location = storage.get_video_url(&vid, true).await.unwrap();
        let path = location.local_path().unwrap().to_path_buf();
        assert_eq!(fs::read(&path).await.unwrap(), b"remote bytes");
        assert!(path.starts_with(storage.cache_root()));
        assert!(storage.is_video_cached(&vid).await.unwrap());

        // Later calls are cache hits.
        assert_eq!(
            storage.get_video_url(&vid, false).await.unwrap(),
            MediaLocation::Local(path)
        );
    }

    #[tokio::test]
    async fn forced_download_of_missing_video_fails() {
        let (storage, _memory, _dir) = caching_storage(None).await;
        let vid = id("dQw4w9WgXcQ");

        let err = storage.get_video_url(&vid, true).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert_eq!(storage.video_status(&vid).await.unwrap(), StorageClass::Offline);
    }

    #[tokio::test]
    async fn unreachable_remote_is_an_error_not_absence() {
        let dir = tempdir().unwrap();
        let storage = S3Storage::with_remote(dir.path().join("cache"), unreachable_remote())
            .await
            .unwrap();
        let vid = id("dQw4w9WgXcQ");

        assert!(matches!(
            storage.video_status(&vid).await,
            Err(StorageError::BackendError(_))
        ));
        assert!(matches!(
            storage.thumbnail_status(&vid).await,
            Err(StorageError::BackendError(_))
        ));

        let known = BTreeSet::from([vid]);
        let result = storage
            .integrity_check(&known, &BTreeSet::new(), &ReconcileOptions::default())
            .await;
        assert!(matches!(result, Err(StorageError::BackendError(_))));
    }

    #[tokio::test]
    async fn thumbnail_url_prefers_cache() {
        let (storage, memory, dir) = caching_storage(None).await;
        let vid = id("dQw4w9WgXcQ");
        put_object(&memory, "dQw4w9WgXcQ.jpg", b"jpeg").await;

        assert!(matches!(
            storage.get_thumbnail_url(&vid).await.unwrap(),
            MediaLocation::Remote(_)
        ));

        let src = dir.path().join("thumb.jpg");
        fs::write(&src, b"jpeg").await.unwrap();
        storage.write_thumbnail(&vid, &src).await.unwrap();

        let location = storage.get_thumbnail_url(&vid).await.unwrap();
        assert!(location
            .local_path()
            .unwrap()
            .ends_with("thumbs/68/49/dQw4w9WgXcQ.jpg"));
    }

    #[tokio::test]
    async fn enumeration_and_delete_are_unsupported() {
        let (storage, _memory, _dir) = caching_storage(None).await;
        assert_eq!(
            storage.capabilities(),
            Capabilities {
                enumerate: false,
                delete: false
            }
        );
        assert!(matches!(
            storage.list_all_videos().await,
            Err(StorageError::Unsupported { .. })
        ));
        assert!(matches!(
            storage.delete_video(&id("dQw4w9WgXcQ")).await,
            Err(StorageError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn backend_type_strips_prefix_separator() {
        let (storage, _memory, _dir) = caching_storage(Some("/videos/")).await;
        assert_eq!(
            storage.backend_type(),
            StorageBackend::S3 {
                bucket: TEST_BUCKET.to_string(),
                prefix: Some("videos".to_string())
            }
        );
        assert_eq!(storage.backend_type().to_string(), "s3:reelvault-test:videos");

        let (storage, _memory, _dir) = caching_storage(None).await;
        assert_eq!(
            storage.backend_type(),
            StorageBackend::S3 {
                bucket: TEST_BUCKET.to_string(),
                prefix: None
            }
        );
    }
}
