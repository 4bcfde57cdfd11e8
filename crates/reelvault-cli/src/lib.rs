use anyhow::Context;
use reelvault_core::AssetId;
use std::collections::BTreeSet;
use std::path::Path;

/// Parse a list of asset ids, one per line.
///
/// Blank lines and `#` comments are skipped. Errors name the offending line.
pub fn parse_id_list(contents: &str) -> anyhow::Result<BTreeSet<AssetId>> {
    let mut ids = BTreeSet::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        }
        .trim();

        if line.is_empty() {
            continue;
        }

        let id = line
            .parse::<AssetId>()
            .with_context(|| format!("line {}", idx + 1))?;
        ids.insert(id);
    }

    Ok(ids)
}

/// Read an id list file (see [`parse_id_list`]).
pub async fn read_id_file(path: &Path) -> anyhow::Result<BTreeSet<AssetId>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_id_list(&contents).with_context(|| format!("Invalid id list {}", path.display()))
}


/// Initialize tracing for CLI binaries.
///
/// Logs go to stderr so stdout stays machine readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
