#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::{RemoteSettings, S3Storage};
use crate::{MediaStorage, StorageBackend, StorageResult};
use reelvault_core::Config;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn MediaStorage>> {
    match &config.storage_backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 { bucket, prefix } => {
            let settings = RemoteSettings {
                bucket: bucket.clone(),
                prefix: prefix.clone(),
                region: config.aws_region.clone(),
                endpoint_url: config.s3_endpoint.clone(),
                access_key_id: config.aws_access_key_id.clone(),
                secret_access_key: config.aws_secret_access_key.clone(),
            };

            let storage = S3Storage::new(config.cache_path.clone(), &settings).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 { .. } => Err(crate::StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local { root } => {
            let storage = LocalStorage::new(root.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local { .. } => Err(crate::StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}
