//! Remote object store client.
//!
//! Thin wrapper over `object_store` that speaks in assets rather than keys:
//! existence probes, block-streamed uploads, atomic downloads into the local
//! tree, presigned GET URLs and a one-shot listing of every asset under the
//! configured prefix.

use crate::keys;
use crate::progress::ProgressSink;
use crate::transfer::{self, TransferReport, BLOCK_SIZE};
use crate::traits::{StorageError, StorageResult};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use http::Method;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{
    DynObjectStore, Error as ObjectStoreError, ObjectStoreExt, PutPayload, WriteMultipart,
};
use reelvault_core::{AssetId, AssetKind};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// Lifetime of every presigned URL (24 hours).
pub const PRESIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Parts in flight during a multipart upload.
const UPLOAD_CONCURRENCY: usize = 2;

/// Connection settings for an S3-compatible store
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: String,
    /// Custom endpoint for S3-compatible providers
    /// (e.g., "http://localhost:9000" for MinIO)
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Sizes recorded for one asset id in a remote listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteSizes {
    pub video: Option<u64>,
    pub thumbnail: Option<u64>,
}

impl RemoteSizes {
    pub fn get(&self, kind: AssetKind) -> Option<u64> {
        match kind {
            AssetKind::Video => self.video,
            AssetKind::Thumbnail => self.thumbnail,
        }
    }

    fn set(&mut self, kind: AssetKind, size: u64) {
        match kind {
            AssetKind::Video => self.video = Some(size),
            AssetKind::Thumbnail => self.thumbnail = Some(size),
        }
    }
}

/// Snapshot of the remote store, taken once per reconciliation
#[derive(Debug, Clone, Default)]
pub struct RemoteListing {
    assets: HashMap<AssetId, RemoteSizes>,
}

impl RemoteListing {
    pub fn record(&mut self, id: AssetId, kind: AssetKind, size: u64) {
        self.assets.entry(id).or_default().set(kind, size);
    }

    pub fn size(&self, id: &AssetId, kind: AssetKind) -> Option<u64> {
        self.assets.get(id).and_then(|sizes| sizes.get(kind))
    }

    pub fn get(&self, id: &AssetId) -> Option<&RemoteSizes> {
        self.assets.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &AssetId> {
        self.assets.keys()
    }

    /// Number of distinct asset ids
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[derive(Clone)]
pub struct RemoteStore {
    store: Arc<DynObjectStore>,
    signer: Arc<dyn Signer>,
    bucket: String,
    prefix: String,
}

impl RemoteStore {
    /// Connect to an S3-compatible bucket.
    ///
    /// Anything not given explicitly (session tokens, ...) is taken from the
    /// standard `AWS_*` environment variables.
    pub fn s3(settings: &RemoteSettings) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(settings.region.clone())
            .with_bucket_name(settings.bucket.clone());

        if let Some(ref endpoint) = settings.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }
        if let Some(ref key_id) = settings.access_key_id {
            builder = builder.with_access_key_id(key_id.clone());
        }
        if let Some(ref secret) = settings.secret_access_key {
            builder = builder.with_secret_access_key(secret.clone());
        }

        let s3 = Arc::new(
            builder
                .build()
                .map_err(|e| StorageError::ConfigError(e.to_string()))?,
        );

        Ok(Self::with_store(
            s3.clone(),
            s3,
            settings.bucket.clone(),
            settings.prefix.as_deref(),
        ))
    }

    /// Wrap an existing store. `signer` issues presigned URLs for it.
    pub fn with_store(
        store: Arc<DynObjectStore>,
        signer: Arc<dyn Signer>,
        bucket: String,
        prefix: Option<&str>,
    ) -> Self {
        RemoteStore {
            store,
            signer,
            bucket,
            prefix: keys::normalize_prefix(prefix),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, id: &AssetId, kind: AssetKind) -> String {
        keys::remote_key(&self.prefix, id, kind)
    }

    /// Size of the remote object, `None` if the store reports it missing.
    ///
    /// Any other failure is returned as a backend error; it is never read as absence.
    pub async fn head(&self, id: &AssetId, kind: AssetKind) -> StorageResult<Option<u64>> {
        let key = self.key(id, kind);
        let location = ObjectPath::from(key.as_str());

        match self.store.head(&location).await {
            Ok(meta) => Ok(Some(meta.size)),
            Err(ObjectStoreError::NotFound { .. }) => Ok(None),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "Remote existence probe failed"
                );
                Err(StorageError::BackendError(e.to_string()))
            }
        }
    }

    pub async fn exists(&self, id: &AssetId, kind: AssetKind) -> StorageResult<bool> {
        Ok(self.head(id, kind).await?.is_some())
    }

    /// Stream a local file to the remote object for `id`/`kind`.
    pub async fn upload(
        &self,
        id: &AssetId,
        kind: AssetKind,
        src: &Path,
        progress: &dyn ProgressSink,
    ) -> StorageResult<TransferReport> {
        let key = self.key(id, kind);
        let start = Instant::now();

        let result = self.upload_inner(&key, src, progress).await;

        match result {
            Ok(bytes) => {
                let report = TransferReport {
                    bytes,
                    duration: start.elapsed(),
                };
                tracing::info!(
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = report.bytes,
                    duration_ms = report.duration_ms(),
                    "Remote upload successful"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Remote upload failed"
                );
                Err(e)
            }
        }
    }

    async fn upload_inner(
        &self,
        key: &str,
        src: &Path,
        progress: &dyn ProgressSink,
    ) -> StorageResult<u64> {
        let expected = fs::metadata(src).await?.len();
        let mut file = fs::File::open(src).await?;
        let location = ObjectPath::from(key);

        // Multipart uploads need at least one full part, so small files go in one PUT.
        if expected <= BLOCK_SIZE as u64 {
            let mut data = Vec::with_capacity(expected as usize);
            file.read_to_end(&mut data).await?;
            let sent = data.len() as u64;
            if sent != expected {
                return Err(StorageError::SizeMismatch {
                    path: src.to_path_buf(),
                    expected,
                    actual: sent,
                });
            }

            self.store
                .put(&location, PutPayload::from(Bytes::from(data)))
                .await
                .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
            progress.on_progress(sent);
            return Ok(sent);
        }

        let upload = self
            .store
            .put_multipart(&location)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, BLOCK_SIZE);
        let mut block = Vec::with_capacity(BLOCK_SIZE);
        let mut sent = 0u64;

        loop {
            block.clear();
            let read = match (&mut file)
                .take(BLOCK_SIZE as u64)
                .read_to_end(&mut block)
                .await
            {
                Ok(read) => read,
                Err(e) => {
                    abort_upload(writer, key).await;
                    return Err(e.into());
                }
            };
            if read == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(UPLOAD_CONCURRENCY).await {
                abort_upload(writer, key).await;
                return Err(StorageError::UploadFailed(e.to_string()));
            }
            writer.write(&block);
            sent += read as u64;
            progress.on_progress(sent);
        }

        if sent != expected {
            abort_upload(writer, key).await;
            return Err(StorageError::SizeMismatch {
                path: src.to_path_buf(),
                expected,
                actual: sent,
            });
        }

        writer
            .finish()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        Ok(sent)
    }

    /// Download the remote object into `dst` through the atomic copy primitive.
    pub async fn download(
        &self,
        id: &AssetId,
        kind: AssetKind,
        dst: &Path,
        progress: &dyn ProgressSink,
    ) -> StorageResult<TransferReport> {
        let key = self.key(id, kind);
        let location = ObjectPath::from(key.as_str());

        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.clone()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    "Remote download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let expected = result.meta.size;
        let body = result.into_stream().map_err(std::io::Error::other);
        let report = transfer::copy_reader_atomic(StreamReader::new(body), expected, dst, progress)
            .await
            .map_err(|e| match e {
                StorageError::IoError(io) => StorageError::DownloadFailed(io.to_string()),
                other => other,
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            path = %dst.display(),
            size_bytes = report.bytes,
            duration_ms = report.duration_ms(),
            "Remote download successful"
        );

        Ok(report)
    }

    /// Time-limited GET URL; no bytes are moved.
    pub async fn presigned_url(&self, id: &AssetId, kind: AssetKind) -> StorageResult<String> {
        let location = ObjectPath::from(self.key(id, kind));

        let url = self
            .signer
            .signed_url(Method::GET, &location, PRESIGNED_URL_TTL)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(url.to_string())
    }

    /// List every asset under the prefix, following pagination until exhausted.
    pub async fn list_assets(&self) -> StorageResult<RemoteListing> {
        let start = Instant::now();
        let prefix = match self.prefix.trim_end_matches('/') {
            "" => None,
            p => Some(ObjectPath::from(p)),
        };

        let mut listing = RemoteListing::default();
        let mut objects = 0usize;
        let mut stream = object_store::ObjectStore::list(self.store.as_ref(), prefix.as_ref());

        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, "Remote listing failed");
                StorageError::BackendError(e.to_string())
            })?;
            objects += 1;

            match keys::parse_remote_key(&self.prefix, meta.location.as_ref()) {
                Some((id, kind)) => listing.record(id, kind, meta.size),
                None => tracing::debug!(key = %meta.location, "Ignoring foreign remote object"),
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            objects,
            assets = listing.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote listing complete"
        );

        Ok(listing)
    }
}

async fn abort_upload(writer: WriteMultipart, key: &str) {
    if let Err(e) = writer.abort().await {
        tracing::warn!(error = %e, key = %key, "Failed to abort multipart upload");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use futures::stream::BoxStream;
    use object_store::memory::InMemory;
    use object_store::{
        CopyOptions, GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta,
        PutMultipartOptions, PutOptions, PutResult, RetryConfig,
    };

    pub const TEST_BUCKET: &str = "reelvault-test";

    fn offline_signer() -> Arc<dyn Signer> {
        let signer = AmazonS3Builder::new()
            .with_bucket_name(TEST_BUCKET)
            .with_region("us-east-1")
            .with_endpoint("http://localhost:9000")
            .with_allow_http(true)
            .with_access_key_id("test-key")
            .with_secret_access_key("test-secret")
            .build()
            .unwrap();
        Arc::new(signer)
    }

    /// In-memory remote plus an offline signer, so tests never touch the network.
    pub fn memory_remote(prefix: Option<&str>) -> (RemoteStore, Arc<InMemory>) {
        let memory = Arc::new(InMemory::new());
        let remote = RemoteStore::with_store(
            memory.clone(),
            offline_signer(),
            TEST_BUCKET.to_string(),
            prefix,
        );
        (remote, memory)
    }

    /// In-memory remote whose uploads to `failing_key` are rejected.
    pub fn flaky_remote(prefix: Option<&str>, failing_key: &str) -> (RemoteStore, Arc<InMemory>) {
        let memory = Arc::new(InMemory::new());
        let store = Arc::new(RejectingPuts {
            inner: memory.clone(),
            failing_key: ObjectPath::from(failing_key),
        });
        let remote =
            RemoteStore::with_store(store, offline_signer(), TEST_BUCKET.to_string(), prefix);
        (remote, memory)
    }

    /// S3 client pointed at a closed local port, without retries.
    ///
    /// Every request fails with a transport error rather than a 404.
    pub fn unreachable_remote() -> RemoteStore {
        let mut retry = RetryConfig::default();
        retry.max_retries = 0;
        let s3 = AmazonS3Builder::new()
            .with_bucket_name(TEST_BUCKET)
            .with_region("us-east-1")
            .with_endpoint("http://127.0.0.1:1")
            .with_allow_http(true)
            .with_access_key_id("test-key")
            .with_secret_access_key("test-secret")
            .with_retry(retry)
            .build()
            .unwrap();
        let s3 = Arc::new(s3);
        RemoteStore::with_store(s3.clone(), s3, TEST_BUCKET.to_string(), None)
    }

    /// Forwards to an in-memory store, except that puts to one key fail.
    #[derive(Debug)]
    struct RejectingPuts {
        inner: Arc<InMemory>,
        failing_key: ObjectPath,
    }

    impl RejectingPuts {
        fn check(&self, location: &ObjectPath) -> object_store::Result<()> {
            if *location == self.failing_key {
                return Err(ObjectStoreError::Generic {
                    store: "rejecting",
                    source: format!("upload of {} rejected", location).into(),
                });
            }
            Ok(())
        }
    }

    impl std::fmt::Display for RejectingPuts {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "RejectingPuts({})", self.failing_key)
        }
    }

    #[async_trait::async_trait]
    impl object_store::ObjectStore for RejectingPuts {
        async fn put_opts(
            &self,
            location: &ObjectPath,
            payload: PutPayload,
            opts: PutOptions,
        ) -> object_store::Result<PutResult> {
            self.check(location)?;
            object_store::ObjectStore::put_opts(self.inner.as_ref(), location, payload, opts).await
        }

        async fn put_multipart_opts(
            &self,
            location: &ObjectPath,
            opts: PutMultipartOptions,
        ) -> object_store::Result<Box<dyn MultipartUpload>> {
            self.check(location)?;
            object_store::ObjectStore::put_multipart_opts(self.inner.as_ref(), location, opts).await
        }

        async fn get_opts(
            &self,
            location: &ObjectPath,
            options: GetOptions,
        ) -> object_store::Result<GetResult> {
            object_store::ObjectStore::get_opts(self.inner.as_ref(), location, options).await
        }

        fn delete_stream(
            &self,
            locations: BoxStream<'static, object_store::Result<ObjectPath>>,
        ) -> BoxStream<'static, object_store::Result<ObjectPath>> {
            object_store::ObjectStore::delete_stream(self.inner.as_ref(), locations)
        }

        fn list(
            &self,
            prefix: Option<&ObjectPath>,
        ) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
            object_store::ObjectStore::list(self.inner.as_ref(), prefix)
        }

        async fn list_with_delimiter(
            &self,
            prefix: Option<&ObjectPath>,
        ) -> object_store::Result<ListResult> {
            object_store::ObjectStore::list_with_delimiter(self.inner.as_ref(), prefix).await
        }

        async fn copy_opts(
            &self,
            from: &ObjectPath,
            to: &ObjectPath,
            options: CopyOptions,
        ) -> object_store::Result<()> {
            object_store::ObjectStore::copy_opts(self.inner.as_ref(), from, to, options).await
        }
    }

    pub async fn put_object(memory: &InMemory, key: &str, data: &[u8]) {
        memory
            .put(
                &ObjectPath::from(key),
                PutPayload::from(Bytes::copy_from_slice(data)),
            )
            .await
            .unwrap();
    }

    pub async fn object_size(memory: &InMemory, key: &str) -> Option<u64> {
        match memory.head(&ObjectPath::from(key)).await {
            Ok(meta) => Some(meta.size),
            Err(ObjectStoreError::NotFound { .. }) => None,
            Err(e) => panic!("unexpected head error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::progress::NoProgress;
    use tempfile::tempdir;

    fn id(raw: &str) -> AssetId {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn head_distinguishes_missing() {
        let (remote, memory) = memory_remote(Some("videos"));
        let vid = id("dQw4w9WgXcQ");
        assert_eq!(remote.head(&vid, AssetKind::Video).await.unwrap(), None);

        put_object(&memory, "videos/dQw4w9WgXcQ.mkv", b"abc").await;
        assert_eq!(remote.head(&vid, AssetKind::Video).await.unwrap(), Some(3));
        assert!(!remote.exists(&vid, AssetKind::Thumbnail).await.unwrap());
    }

    #[tokio::test]
    async fn upload_small_and_multipart() {
        let dir = tempdir().unwrap();
        let (remote, memory) = memory_remote(None);

        let small = dir.path().join("small");
        fs::write(&small, b"thumbnail").await.unwrap();
        let report = remote
            .upload(&id("dQw4w9WgXcQ"), AssetKind::Thumbnail, &small, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.bytes, 9);
        assert_eq!(object_size(&memory, "dQw4w9WgXcQ.jpg").await, Some(9));

        let large = dir.path().join("large");
        let size = BLOCK_SIZE * 2 + 17;
        fs::write(&large, vec![3u8; size]).await.unwrap();
        remote
            .upload(&id("dQw4w9WgXcQ"), AssetKind::Video, &large, &NoProgress)
            .await
            .unwrap();
        assert_eq!(
            object_size(&memory, "dQw4w9WgXcQ.mkv").await,
            Some(size as u64)
        );
    }

    #[tokio::test]
    async fn download_commits_atomically() {
        let dir = tempdir().unwrap();
        let (remote, memory) = memory_remote(None);
        put_object(&memory, "dQw4w9WgXcQ.mkv", b"remote bytes").await;

        let dst = dir.path().join("68/49/dQw4w9WgXcQ.mkv");
        let report = remote
            .download(&id("dQw4w9WgXcQ"), AssetKind::Video, &dst, &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.bytes, 12);
        assert_eq!(fs::read(&dst).await.unwrap(), b"remote bytes");
        assert!(!transfer::temp_path(&dst).exists());
    }

    #[tokio::test]
    async fn download_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let (remote, _) = memory_remote(None);
        let dst = dir.path().join("x.mkv");
        let err = remote
            .download(&id("dQw4w9WgXcQ"), AssetKind::Video, &dst, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn presigned_url_names_bucket_and_key() {
        let (remote, _) = memory_remote(Some("videos"));
        let url = remote
            .presigned_url(&id("dQw4w9WgXcQ"), AssetKind::Video)
            .await
            .unwrap();
        assert!(url.contains(TEST_BUCKET));
        assert!(url.contains("videos/dQw4w9WgXcQ.mkv"));
        assert!(url.contains("X-Amz-Expires=86400"));
    }

    #[tokio::test]
    async fn listing_groups_by_id_and_ignores_foreign_keys() {
        let (remote, memory) = memory_remote(Some("videos/"));
        put_object(&memory, "videos/dQw4w9WgXcQ.mkv", b"12345").await;
        put_object(&memory, "videos/dQw4w9WgXcQ.jpg", b"12").await;
        put_object(&memory, "videos/-_w4w9WgXcQ.jpg", b"1").await;
        put_object(&memory, "videos/readme.txt", b"hi").await;
        put_object(&memory, "videos/nested/dQw4w9WgXcQ.mkv", b"1").await;
        put_object(&memory, "other/aaaaaaaaaaa.mkv", b"1").await;

        let listing = remote.list_assets().await.unwrap();
        assert_eq!(listing.len(), 2);

        let a = id("dQw4w9WgXcQ");
        assert_eq!(listing.size(&a, AssetKind::Video), Some(5));
        assert_eq!(listing.size(&a, AssetKind::Thumbnail), Some(2));

        let b = id("-_w4w9WgXcQ");
        assert_eq!(
            listing.get(&b),
            Some(&RemoteSizes {
                video: None,
                thumbnail: Some(1)
            })
        );
    }
}
