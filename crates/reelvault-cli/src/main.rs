//! Reelvault CLI: operator access to the media storage layer.
//!
//! The backend is chosen by REELVAULT_STORAGE (a local root or `s3:<bucket>[:<prefix>]`).
//! Output is JSON on stdout; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use reelvault_cli::{init_tracing, read_id_file};
use reelvault_core::{AssetId, Config};
use reelvault_storage::{create_storage, MediaStorage, ReconcileOptions};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "reelvault", about = "Reelvault media storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show where the video and thumbnail of an asset are stored
    Status {
        /// Asset id
        id: AssetId,
    },
    /// Print a local path or presigned URL for an asset
    Url {
        /// Asset id
        id: AssetId,
        /// Download a remote-only video into the cache first
        #[arg(long)]
        download: bool,
        /// Resolve the thumbnail instead of the video
        #[arg(long, conflicts_with = "download")]
        thumbnail: bool,
    },
    /// Store a fetched video (and optionally its thumbnail)
    Write {
        /// Asset id
        id: AssetId,
        /// Path to the video file
        #[arg(long)]
        video: PathBuf,
        /// Path to the thumbnail file
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },
    /// List every stored video
    List,
    /// Delete a video and its thumbnail
    Delete {
        /// Asset id
        id: AssetId,
    },
    /// Run an integrity check against the known and pinned sets
    Check {
        /// File with the known asset ids, one per line
        #[arg(long)]
        known: PathBuf,
        /// File with the pinned asset ids, one per line
        #[arg(long)]
        pinned: Option<PathBuf>,
        /// Assets reconciled in parallel (defaults to REELVAULT_RECONCILE_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[derive(Serialize)]
struct StatusOutput {
    id: AssetId,
    video: reelvault_core::StorageClass,
    thumbnail: reelvault_core::StorageClass,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    let storage = create_storage(&config).await.with_context(|| {
        format!(
            "Failed to open storage backend {}",
            config.storage_backend
        )
    })?;

    match cli.command {
        Commands::Status { id } => {
            let output = StatusOutput {
                video: storage.video_status(&id).await?,
                thumbnail: storage.thumbnail_status(&id).await?,
                id,
            };
            print_json(&output)?;
        }
        Commands::Url {
            id,
            download,
            thumbnail,
        } => {
            let location = if thumbnail {
                storage.get_thumbnail_url(&id).await?
            } else {
                storage.get_video_url(&id, download).await?
            };
            print_json(&location)?;
        }
        Commands::Write {
            id,
            video,
            thumbnail,
        } => {
            storage
                .write_video(&id, &video)
                .await
                .with_context(|| format!("Failed to store video {}", video.display()))?;
            if let Some(thumbnail) = thumbnail {
                storage
                    .write_thumbnail(&id, &thumbnail)
                    .await
                    .with_context(|| {
                        format!("Failed to store thumbnail {}", thumbnail.display())
                    })?;
            }
            tracing::info!(asset_id = %id, "Assets stored");
            print_json(&serde_json::json!({
                "id": id,
                "video": storage.video_status(&id).await?,
                "thumbnail": storage.thumbnail_status(&id).await?,
            }))?;
        }
        Commands::List => {
            require(&storage, storage.capabilities().enumerate, "list")?;
            let mut videos = storage.list_all_videos().await?;
            videos.sort();
            print_json(&videos)?;
        }
        Commands::Delete { id } => {
            require(&storage, storage.capabilities().delete, "delete")?;
            storage.delete_video(&id).await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("Asset {} deleted", id) }),
            )?;
        }
        Commands::Check {
            known,
            pinned,
            concurrency,
        } => {
            let known = read_id_file(&known).await?;
            let pinned = match pinned {
                Some(path) => read_id_file(&path).await?,
                None => BTreeSet::new(),
            };
            let options = ReconcileOptions {
                concurrency: concurrency.unwrap_or(config.reconcile_concurrency),
            };
            anyhow::ensure!(options.concurrency > 0, "--concurrency must be at least 1");

            let report = storage.integrity_check(&known, &pinned, &options).await?;
            print_json(&report)?;

            if !report.is_clean() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn require(storage: &Arc<dyn MediaStorage>, supported: bool, command: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        supported,
        "The {} backend does not support `{}`",
        storage.backend_type(),
        command
    );
    Ok(())
}
