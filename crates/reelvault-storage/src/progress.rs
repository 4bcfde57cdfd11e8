//! Transfer progress reporting.

/// Receives the running byte count of a single transfer.
///
/// Called after every block with the total transferred so far. Implementations
/// must be cheap; they run inline with the copy loop.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, transferred: u64);
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _transferred: u64) {}
}

/// Logs progress at debug level against a known total.
pub struct LogProgress {
    operation: &'static str,
    label: String,
    total: u64,
}

impl LogProgress {
    pub fn new(operation: &'static str, label: impl Into<String>, total: u64) -> Self {
        Self {
            operation,
            label: label.into(),
            total,
        }
    }

    /// Progress for copying `src`, using its current size as the total.
    pub async fn for_file(
        operation: &'static str,
        label: impl Into<String>,
        src: &std::path::Path,
    ) -> std::io::Result<Self> {
        let total = tokio::fs::metadata(src).await?.len();
        Ok(Self::new(operation, label, total))
    }
}

impl ProgressSink for LogProgress {
    fn on_progress(&self, transferred: u64) {
        tracing::debug!(
            operation = self.operation,
            asset = %self.label,
            transferred = %format_size(transferred),
            total = %format_size(self.total),
            percent = format_args!("{:.1}", percent(transferred, self.total)),
            "Transfer progress"
        );
    }
}

impl<F> ProgressSink for F
where
    F: Fn(u64) + Send + Sync,
{
    fn on_progress(&self, transferred: u64) {
        self(transferred)
    }
}

/// Percentage of `total`; an empty total counts as complete.
pub fn percent(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    transferred as f64 * 100.0 / total as f64
}

/// Human readable size using binary prefixes.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(&str, u32); 4] = [("KiB", 10), ("MiB", 20), ("GiB", 30), ("TiB", 40)];

    if bytes < 1 << 10 {
        return format!("{} B", bytes);
    }

    let (unit, shift) = UNITS
        .iter()
        .rev()
        .find(|(_, shift)| bytes >= 1u64 << shift)
        .copied()
        .unwrap_or(UNITS[0]);

    format!("{:.2} {}", bytes as f64 / (1u64 << shift) as f64, unit)
}
