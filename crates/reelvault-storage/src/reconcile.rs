//! Integrity reconciliation
//!
//! Converges the local tree, the remote store and the externally supplied known
//! and pinned sets. A run keeps no state between invocations and never stops on
//! a single bad asset: every problem is recorded as an [`Anomaly`] and the loop
//! moves on.
//!
//! For the caching backend, each known id goes through:
//!
//! 1. Video and thumbnail legs, independently: a local copy is authoritative and
//!    is (re-)uploaded when the remote listing lacks it or records a different
//!    size. No copy anywhere is reported as a missing asset and left alone.
//! 2. Pin enforcement on the video: pinned and not cached means download,
//!    cached and not pinned means evict the local copy. Eviction only happens
//!    once the remote copy is confirmed for this run.

use crate::disk::MediaTree;
use crate::traits::StorageResult;
use reelvault_core::{AssetId, AssetKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Settings for a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Known ids processed in parallel. 1 keeps transfers strictly serialized.
    pub concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOp {
    Upload,
    Download,
    Evict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Known id with no copy in any store. Needs a human.
    MissingAsset,
    /// Local file whose id is not known
    OrphanedLocal,
    /// Remote object whose id is not known
    OrphanedRemote,
    /// Cached copy kept because the remote copy could not be confirmed
    EvictionSkipped,
    TransferFailed { operation: TransferOp, error: String },
    /// Local state could not be read
    CheckFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub id: AssetId,
    pub asset: AssetKind,
    #[serde(flatten)]
    pub kind: AnomalyKind,
}

impl Anomaly {
    fn new(id: &AssetId, asset: AssetKind, kind: AnomalyKind) -> Self {
        match &kind {
            AnomalyKind::MissingAsset => {
                tracing::error!(asset_id = %id, kind = %asset, "Missing asset")
            }
            AnomalyKind::OrphanedLocal => {
                tracing::warn!(asset_id = %id, kind = %asset, "Orphaned local file")
            }
            AnomalyKind::OrphanedRemote => {
                tracing::warn!(asset_id = %id, kind = %asset, "Orphaned remote object")
            }
            AnomalyKind::EvictionSkipped => tracing::warn!(
                asset_id = %id,
                kind = %asset,
                "Remote copy unconfirmed, keeping cached copy"
            ),
            AnomalyKind::TransferFailed { operation, error } => tracing::error!(
                asset_id = %id,
                kind = %asset,
                operation = ?operation,
                error = %error,
                "Transfer failed"
            ),
            AnomalyKind::CheckFailed { error } => tracing::error!(
                asset_id = %id,
                kind = %asset,
                error = %error,
                "Could not inspect local copy"
            ),
        }

        Anomaly {
            id: id.clone(),
            asset,
            kind,
        }
    }
}

/// Summary of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Size of the known set
    pub known: usize,
    /// Distinct ids in the remote listing
    pub remote: usize,
    /// Size of the pin set
    pub pinned: usize,
    pub uploaded: usize,
    pub promoted: usize,
    pub evicted: usize,
    pub anomalies: Vec<Anomaly>,
    /// Steps that could not run at all, e.g. an unreadable cache tree
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty() && self.errors.is_empty()
    }

    /// Known assets with no copy anywhere.
    pub fn missing(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::MissingAsset)
    }

    fn merge(&mut self, outcome: AssetOutcome) {
        self.uploaded += outcome.uploaded;
        self.promoted += outcome.promoted;
        self.evicted += outcome.evicted;
        self.anomalies.extend(outcome.anomalies);
        self.errors.extend(outcome.errors);
    }

    fn finish(mut self) -> Self {
        self.anomalies
            .sort_by(|a, b| (&a.id, a.asset).cmp(&(&b.id, b.asset)));

        tracing::info!(
            known = self.known,
            remote = self.remote,
            pinned = self.pinned,
            uploaded = self.uploaded,
            promoted = self.promoted,
            evicted = self.evicted,
            anomalies = self.anomalies.len(),
            errors = self.errors.len(),
            "Integrity check completed"
        );
        self
    }
}

/// What happened to one known id
#[derive(Debug, Default)]
struct AssetOutcome {
    uploaded: usize,
    promoted: usize,
    evicted: usize,
    anomalies: Vec<Anomaly>,
    errors: Vec<String>,
}

impl AssetOutcome {
    fn anomaly(&mut self, id: &AssetId, asset: AssetKind, kind: AnomalyKind) {
        self.anomalies.push(Anomaly::new(id, asset, kind));
    }
}

/// Integrity check for the local-only backend: orphans and missing files.
///
/// Every asset is permanent, so the pin set only contributes to the summary.
pub async fn check_local(
    tree: &MediaTree,
    known: &BTreeSet<AssetId>,
    pinned: &BTreeSet<AssetId>,
) -> StorageResult<ReconcileReport> {
    let on_disk: HashSet<AssetId> = tree.list_videos().await?.into_iter().collect();

    let mut report = ReconcileReport {
        known: known.len(),
        pinned: pinned.len(),
        ..Default::default()
    };
    let mut outcome = AssetOutcome::default();

    for id in on_disk.iter().filter(|id| !known.contains(*id)) {
        outcome.anomaly(id, AssetKind::Video, AnomalyKind::OrphanedLocal);
    }

    for id in known {
        if !on_disk.contains(id) {
            outcome.anomaly(id, AssetKind::Video, AnomalyKind::MissingAsset);
        }
        match tree.exists(id, AssetKind::Thumbnail).await {
            Ok(true) => {}
            Ok(false) => outcome.anomaly(id, AssetKind::Thumbnail, AnomalyKind::MissingAsset),
            Err(e) => outcome.anomaly(
                id,
                AssetKind::Thumbnail,
                AnomalyKind::CheckFailed {
                    error: e.to_string(),
                },
            ),
        }
    }

    report.merge(outcome);
    Ok(report.finish())
}

#[cfg(feature = "storage-s3")]
pub use caching::Reconciler;

#[cfg(feature = "storage-s3")]
mod caching {
    use super::*;
    use crate::progress::LogProgress;
    use crate::remote::{RemoteListing, RemoteStore};
    use futures::stream::{self, StreamExt};

    /// Where one leg of an asset stands after syncing
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum LegState {
        /// Cached, and the remote copy matches
        Confirmed,
        /// Cached, but the remote copy could not be brought up to date
        Unconfirmed,
        RemoteOnly,
        Missing,
        /// Local state unreadable
        Unknown,
    }

    /// Reconciler for the caching remote backend
    pub struct Reconciler<'a> {
        cache: &'a MediaTree,
        remote: &'a RemoteStore,
    }

    impl<'a> Reconciler<'a> {
        pub fn new(cache: &'a MediaTree, remote: &'a RemoteStore) -> Self {
            Self { cache, remote }
        }

        /// Run one reconciliation pass.
        ///
        /// Fails only if the remote listing cannot be fetched, before anything
        /// is moved; everything after that ends up in the report.
        #[tracing::instrument(skip_all, fields(known = known.len(), pinned = pinned.len()))]
        pub async fn run(
            &self,
            known: &BTreeSet<AssetId>,
            pinned: &BTreeSet<AssetId>,
            options: &ReconcileOptions,
        ) -> StorageResult<ReconcileReport> {
            let listing = self.remote.list_assets().await?;

            tracing::info!(
                known = known.len(),
                remote = listing.len(),
                pinned = pinned.len(),
                "Starting integrity check"
            );

            let mut report = ReconcileReport {
                known: known.len(),
                remote: listing.len(),
                pinned: pinned.len(),
                ..Default::default()
            };

            // The listing is shared read-only by every in-flight asset.
            let listing = &listing;
            let outcomes: Vec<AssetOutcome> = stream::iter(known.iter())
                .map(move |id| self.reconcile_asset(id, listing, pinned.contains(id)))
                .boxed()
                .buffer_unordered(options.concurrency.max(1))
                .collect()
                .await;

            for outcome in outcomes {
                report.merge(outcome);
            }

            report.merge(self.orphans(known, listing).await);

            Ok(report.finish())
        }

        async fn reconcile_asset(
            &self,
            id: &AssetId,
            listing: &RemoteListing,
            pinned: bool,
        ) -> AssetOutcome {
            let mut outcome = AssetOutcome::default();

            let video = self
                .sync_leg(id, AssetKind::Video, listing, &mut outcome)
                .await;
            self.sync_leg(id, AssetKind::Thumbnail, listing, &mut outcome)
                .await;

            match (pinned, video) {
                (true, LegState::RemoteOnly) => {
                    let total = listing.size(id, AssetKind::Video).unwrap_or(0);
                    self.promote(id, total, &mut outcome).await
                }
                (false, LegState::Confirmed) => self.evict(id, &mut outcome).await,
                (false, LegState::Unconfirmed) => {
                    outcome.anomaly(id, AssetKind::Video, AnomalyKind::EvictionSkipped)
                }
                _ => {}
            }

            outcome
        }

        async fn sync_leg(
            &self,
            id: &AssetId,
            kind: AssetKind,
            listing: &RemoteListing,
            outcome: &mut AssetOutcome,
        ) -> LegState {
            let remote_size = listing.size(id, kind);

            let local_size = match self.cache.size(id, kind).await {
                Ok(size) => size,
                Err(e) => {
                    outcome.anomaly(
                        id,
                        kind,
                        AnomalyKind::CheckFailed {
                            error: e.to_string(),
                        },
                    );
                    return LegState::Unknown;
                }
            };

            let Some(local_size) = local_size else {
                if remote_size.is_none() {
                    outcome.anomaly(id, kind, AnomalyKind::MissingAsset);
                    return LegState::Missing;
                }
                return LegState::RemoteOnly;
            };

            if remote_size == Some(local_size) {
                return LegState::Confirmed;
            }

            tracing::info!(
                asset_id = %id,
                kind = %kind,
                local_size,
                remote_size = ?remote_size,
                "Uploading local copy"
            );

            let path = self.cache.path(id, kind);
            let progress = LogProgress::new("upload", keyed(id, kind), local_size);
            match self.remote.upload(id, kind, &path, &progress).await {
                Ok(_) => {
                    outcome.uploaded += 1;
                    LegState::Confirmed
                }
                Err(e) => {
                    outcome.anomaly(
                        id,
                        kind,
                        AnomalyKind::TransferFailed {
                            operation: TransferOp::Upload,
                            error: e.to_string(),
                        },
                    );
                    LegState::Unconfirmed
                }
            }
        }

        async fn promote(&self, id: &AssetId, total: u64, outcome: &mut AssetOutcome) {
            tracing::info!(asset_id = %id, size_bytes = total, "Caching pinned video");

            let path = self.cache.path(id, AssetKind::Video);
            let progress = LogProgress::new("download", keyed(id, AssetKind::Video), total);

            match self
                .remote
                .download(id, AssetKind::Video, &path, &progress)
                .await
            {
                Ok(_) => outcome.promoted += 1,
                Err(e) => outcome.anomaly(
                    id,
                    AssetKind::Video,
                    AnomalyKind::TransferFailed {
                        operation: TransferOp::Download,
                        error: e.to_string(),
                    },
                ),
            }
        }

        async fn evict(&self, id: &AssetId, outcome: &mut AssetOutcome) {
            tracing::info!(asset_id = %id, "Evicting video");

            match self.cache.remove(id, AssetKind::Video).await {
                Ok(()) => outcome.evicted += 1,
                Err(e) => outcome.anomaly(
                    id,
                    AssetKind::Video,
                    AnomalyKind::TransferFailed {
                        operation: TransferOp::Evict,
                        error: e.to_string(),
                    },
                ),
            }
        }

        /// Report cached videos and remote objects whose id is not known. Nothing is deleted.
        ///
        /// An unreadable cache tree is recorded in the report; the transfers of
        /// this run have already happened and their results are kept.
        async fn orphans(
            &self,
            known: &BTreeSet<AssetId>,
            listing: &RemoteListing,
        ) -> AssetOutcome {
            let mut outcome = AssetOutcome::default();

            match self.cache.list_videos().await {
                Ok(cached) => {
                    for id in cached.iter().filter(|id| !known.contains(*id)) {
                        outcome.anomaly(id, AssetKind::Video, AnomalyKind::OrphanedLocal);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        cache = %self.cache.root().display(),
                        "Could not enumerate cache for orphans"
                    );
                    outcome
                        .errors
                        .push(format!("Cache enumeration failed: {}", e));
                }
            }

            for id in listing.ids().filter(|id| !known.contains(*id)) {
                for kind in AssetKind::ALL {
                    if listing.size(id, kind).is_some() {
                        outcome.anomaly(id, kind, AnomalyKind::OrphanedRemote);
                    }
                }
            }

            outcome
        }
    }

    fn keyed(id: &AssetId, kind: AssetKind) -> String {
        format!("{}{}", id, kind.extension())
    }
}
