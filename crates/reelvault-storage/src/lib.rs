//! Reelvault Storage Library
//!
//! Tiered storage for archived videos and their thumbnails. Two backends sit
//! behind the [`MediaStorage`] trait:
//!
//! - **Local**: every asset lives permanently in a sharded directory tree.
//! - **S3**: the bucket holds every asset, a local cache tree holds pinned
//!   videos and recent writes. Misses are served as presigned URLs.
//!
//! # Layout
//!
//! Both backends share the local layout (`{root}/{s0}/{s1}/{id}.mkv`, thumbnails
//! under `{root}/thumbs/`) and the remote one (`{prefix}{id}.mkv`). Path and key
//! generation is centralized in the `keys` module.
//!
//! Every local write goes through a temp file plus rename, so a partially written
//! file is never visible under its final name.

pub mod disk;
pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod progress;
pub mod reconcile;
#[cfg(feature = "storage-s3")]
pub mod remote;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;
pub mod transfer;

// Re-export commonly used types
pub use disk::MediaTree;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use progress::{format_size, LogProgress, NoProgress, ProgressSink};
pub use reconcile::{Anomaly, AnomalyKind, ReconcileOptions, ReconcileReport, TransferOp};
pub use reelvault_core::{AssetId, AssetKind, StorageBackend, StorageClass};
#[cfg(feature = "storage-s3")]
pub use remote::{RemoteSettings, RemoteStore};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Capabilities, MediaLocation, MediaStorage, StorageError, StorageResult};
