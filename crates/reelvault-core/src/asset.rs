//! Asset identity
//!
//! Every archived item is keyed by an 11 character identifier drawn from the
//! URL-safe base64 alphabet. The same identifier addresses both the video and
//! the thumbnail of the item.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Length of every asset identifier.
pub const ASSET_ID_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetIdError {
    #[error("Invalid asset id {value:?}: expected {ASSET_ID_LEN} characters, got {len}")]
    Length { value: String, len: usize },

    #[error("Invalid asset id {value:?}: character {ch:?} is not in [A-Za-z0-9_-]")]
    Character { value: String, ch: char },
}

/// Validated asset identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(value: impl Into<String>) -> Result<Self, AssetIdError> {
        let value = value.into();

        if let Some(ch) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(AssetIdError::Character { value, ch });
        }

        // Only ASCII remains past the character check, so bytes == chars.
        if value.len() != ASSET_ID_LEN {
            let len = value.len();
            return Err(AssetIdError::Length { value, len });
        }

        Ok(AssetId(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two bytes of the id, used for directory fan-out.
    pub fn shard_bytes(&self) -> (u8, u8) {
        let bytes = self.0.as_bytes();
        (bytes[0], bytes[1])
    }
}

impl FromStr for AssetId {
    type Err = AssetIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetId::new(s)
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AssetId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// The two independently stored assets of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Thumbnail,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Video, AssetKind::Thumbnail];

    /// File extension, including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Video => ".mkv",
            AssetKind::Thumbnail => ".jpg",
        }
    }

    /// Recognise a file or object name as `<id><extension>`.
    pub fn parse_file_name(name: &str) -> Option<(AssetId, AssetKind)> {
        AssetKind::ALL.into_iter().find_map(|kind| {
            let stem = name.strip_suffix(kind.extension())?;
            AssetId::new(stem).ok().map(|id| (id, kind))
        })
    }
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetKind::Video => write!(f, "video"),
            AssetKind::Thumbnail => write!(f, "thumbnail"),
        }
    }
}
