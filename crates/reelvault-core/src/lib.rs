//! Reelvault Core Library
//!
//! Domain types shared by the storage layer and its callers: asset identity,
//! storage classification, backend selection and configuration.

pub mod asset;
pub mod config;
pub mod storage_types;

// Re-export commonly used types
pub use asset::{AssetId, AssetIdError, AssetKind, ASSET_ID_LEN};
pub use config::Config;
pub use storage_types::{StorageBackend, StorageClass};
