//! Configuration module
//!
//! Backend selection, remote credentials and reconciliation settings, all read
//! from the process environment (optionally seeded from a `.env` file).

use std::env;
use std::path::PathBuf;

use crate::storage_types::StorageBackend;

const DEFAULT_MEDIA_PATH: &str = "./media";
const DEFAULT_AWS_REGION: &str = "us-east-1";
const RECONCILE_CONCURRENCY: usize = 1;

#[derive(Clone, Debug)]
pub struct Config {
    pub storage_backend: StorageBackend,
    /// Local cache root used when the backend is remote
    pub cache_path: PathBuf,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, R2, ...)
    pub aws_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub reconcile_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage_backend = var("REELVAULT_STORAGE")
            .unwrap_or_else(|| DEFAULT_MEDIA_PATH.to_string())
            .parse::<StorageBackend>()?;

        let reconcile_concurrency = match var("REELVAULT_RECONCILE_CONCURRENCY") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                anyhow::anyhow!("REELVAULT_RECONCILE_CONCURRENCY must be a valid number")
            })?,
            None => RECONCILE_CONCURRENCY,
        };

        Ok(Config {
            storage_backend,
            cache_path: var("REELVAULT_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_PATH)),
            s3_endpoint: var("AWS_ENDPOINT_URL"),
            aws_region: var("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
            aws_access_key_id: var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            reconcile_concurrency,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.reconcile_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "REELVAULT_RECONCILE_CONCURRENCY must be at least 1"
            ));
        }

        if matches!(self.storage_backend, StorageBackend::S3 { .. }) {
            if self.aws_access_key_id.is_none() {
                return Err(anyhow::anyhow!(
                    "AWS_ACCESS_KEY_ID must be set for the s3 storage backend"
                ));
            }
            if self.aws_secret_access_key.is_none() {
                return Err(anyhow::anyhow!(
                    "AWS_SECRET_ACCESS_KEY must be set for the s3 storage backend"
                ));
            }
        }

        Ok(())
    }
}
