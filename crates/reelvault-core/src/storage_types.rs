use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

/// Closest location an asset is currently stored in
///
/// Always derived from existence checks at the time of the call; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    /// Not present in any known store
    Offline,
    /// Present in the local cache
    Local,
    /// Present remotely, not cached
    Remote,
}

impl StorageClass {
    /// Combine presence facts from both tiers.
    ///
    /// A local copy always wins, even if the remote copy is missing or stale.
    pub fn from_presence(local: bool, remote: bool) -> Self {
        match (local, remote) {
            (true, _) => StorageClass::Local,
            (false, true) => StorageClass::Remote,
            (false, false) => StorageClass::Offline,
        }
    }
}

impl Display for StorageClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageClass::Offline => write!(f, "offline"),
            StorageClass::Local => write!(f, "local"),
            StorageClass::Remote => write!(f, "remote"),
        }
    }
}

/// Storage backend selection
///
/// Parsed from a single descriptor string: `s3:<bucket>[:<prefix>]` selects the
/// caching remote backend, anything else is a local filesystem root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        prefix: Option<String>,
    },
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix("s3:") else {
            if s.is_empty() {
                return Err(anyhow::anyhow!("Storage descriptor is empty"));
            }
            return Ok(StorageBackend::Local {
                root: PathBuf::from(s),
            });
        };

        let (bucket, prefix) = match rest.split_once(':') {
            Some((bucket, prefix)) => (bucket, Some(prefix)),
            None => (rest, None),
        };

        if bucket.is_empty() {
            return Err(anyhow::anyhow!("Invalid storage descriptor {}: missing bucket", s));
        }

        Ok(StorageBackend::S3 {
            bucket: bucket.to_string(),
            prefix: prefix.filter(|p| !p.is_empty()).map(String::from),
        })
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Local { root } => write!(f, "{}", root.display()),
            StorageBackend::S3 {
                bucket,
                prefix: Some(prefix),
            } => write!(f, "s3:{}:{}", bucket, prefix),
            StorageBackend::S3 {
                bucket,
                prefix: None,
            } => write!(f, "s3:{}", bucket),
        }
    }
}
