//! Block-streaming copy with atomic commit.
//!
//! Bytes are written to `<dst>.tmp` and only renamed onto `dst` once the temp
//! file holds exactly the expected number of bytes. A reader that observes
//! `dst` therefore always sees a complete file. On a size mismatch the temp
//! file is left behind for inspection.

use crate::progress::ProgressSink;
use crate::traits::{StorageError, StorageResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// 8 MiB
pub const BLOCK_SIZE: usize = 1 << 23;

pub const TEMP_SUFFIX: &str = ".tmp";

/// Outcome of a committed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes: u64,
    pub duration: Duration,
}

impl TransferReport {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// `<dst>.tmp`, next to the final file so the rename stays on one filesystem.
pub fn temp_path(dst: &Path) -> PathBuf {
    let mut name = dst
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    dst.with_file_name(name)
}

/// Ensure parent directory exists
pub async fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Copy a local file to `dst` atomically.
pub async fn copy_atomic(
    src: &Path,
    dst: &Path,
    progress: &dyn ProgressSink,
) -> StorageResult<TransferReport> {
    let expected = fs::metadata(src).await?.len();
    let reader = fs::File::open(src).await?;
    copy_reader_atomic(reader, expected, dst, progress).await
}

/// Stream `reader` into `dst` atomically, failing if it does not yield `expected` bytes.
pub async fn copy_reader_atomic<R>(
    mut reader: R,
    expected: u64,
    dst: &Path,
    progress: &dyn ProgressSink,
) -> StorageResult<TransferReport>
where
    R: AsyncRead + Unpin,
{
    let start = Instant::now();
    ensure_parent_dir(dst).await?;

    let tmp = temp_path(dst);
    let mut file = fs::File::create(&tmp).await?;
    let mut block = Vec::with_capacity(BLOCK_SIZE);
    let mut copied = 0u64;

    loop {
        block.clear();
        let read = (&mut reader)
            .take(BLOCK_SIZE as u64)
            .read_to_end(&mut block)
            .await?;
        if read == 0 {
            break;
        }
        file.write_all(&block).await?;
        copied += read as u64;
        progress.on_progress(copied);
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    commit(&tmp, dst, expected).await?;

    Ok(TransferReport {
        bytes: copied,
        duration: start.elapsed(),
    })
}

/// The single commit point: size check, then rename.
async fn commit(tmp: &Path, dst: &Path, expected: u64) -> StorageResult<()> {
    let actual = fs::metadata(tmp).await?.len();
    if actual != expected {
        tracing::error!(
            path = %dst.display(),
            temp_path = %tmp.display(),
            expected,
            actual,
            "Transfer size mismatch, temp file kept"
        );
        return Err(StorageError::SizeMismatch {
            path: dst.to_path_buf(),
            expected,
            actual,
        });
    }

    fs::rename(tmp, dst).await?;
    Ok(())
}
