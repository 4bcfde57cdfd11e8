//! Content addressing shared by every backend.
//!
//! Local layout: `{root}/{s0}/{s1}/{id}.mkv` and `{root}/thumbs/{s0}/{s1}/{id}.jpg`,
//! where `s0`/`s1` are the character codes of the first two id characters minus 32.
//! Remote layout: `{prefix}{id}.mkv` and `{prefix}{id}.jpg`.

use reelvault_core::{AssetId, AssetKind};
use std::path::{Path, PathBuf};

/// Subtree holding thumbnails, so video and thumbnail fan-out never collide.
pub const THUMBNAIL_DIR: &str = "thumbs";

/// Offset that makes printable ASCII start near zero.
const SHARD_OFFSET: u8 = 32;

/// Two-level shard segment for an id, e.g. `68/49` for `dQw4w9WgXcQ`.
pub fn shard_dir(id: &AssetId) -> PathBuf {
    let (s0, s1) = id.shard_bytes();
    PathBuf::from((s0 - SHARD_OFFSET).to_string()).join((s1 - SHARD_OFFSET).to_string())
}

/// Directory that holds the asset of `kind` for `id`.
pub fn local_dir(root: &Path, id: &AssetId, kind: AssetKind) -> PathBuf {
    match kind {
        AssetKind::Video => root.join(shard_dir(id)),
        AssetKind::Thumbnail => root.join(THUMBNAIL_DIR).join(shard_dir(id)),
    }
}

pub fn file_name(id: &AssetId, kind: AssetKind) -> String {
    format!("{}{}", id, kind.extension())
}

/// Full local path of an asset.
pub fn local_path(root: &Path, id: &AssetId, kind: AssetKind) -> PathBuf {
    local_dir(root, id, kind).join(file_name(id, kind))
}

/// Normalise an operator supplied prefix to either `""` or `"segment/"`.
pub fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{}/", p),
        _ => String::new(),
    }
}

/// Flat remote object key for an asset.
pub fn remote_key(prefix: &str, id: &AssetId, kind: AssetKind) -> String {
    format!("{}{}", prefix, file_name(id, kind))
}

/// Inverse of [`remote_key`]: recognise keys that live directly under `prefix`.
pub fn parse_remote_key(prefix: &str, key: &str) -> Option<(AssetId, AssetKind)> {
    let name = key.strip_prefix(prefix)?;
    if name.contains('/') {
        return None;
    }
    AssetKind::parse_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> AssetId {
        raw.parse().unwrap()
    }

    #[test]
    fn shard_dir_uses_offset_character_codes() {
        // 'd' = 100, 'Q' = 81
        assert_eq!(shard_dir(&id("dQw4w9WgXcQ")), PathBuf::from("68/49"));
        // '-' = 45, '_' = 95
        assert_eq!(shard_dir(&id("-_w4w9WgXcQ")), PathBuf::from("13/63"));
    }

    #[test]
    fn shard_dir_is_stable() {
        let a = id("dQw4w9WgXcQ");
        let b = id("dQw4w9WgXcQ");
        assert_eq!(shard_dir(&a), shard_dir(&b));
        assert_eq!(shard_dir(&a), shard_dir(&a));
    }

    #[test]
    fn local_paths_separate_thumbnails() {
        let root = Path::new("/srv/media");
        let id = id("dQw4w9WgXcQ");
        assert_eq!(
            local_path(root, &id, AssetKind::Video),
            PathBuf::from("/srv/media/68/49/dQw4w9WgXcQ.mkv")
        );
        assert_eq!(
            local_path(root, &id, AssetKind::Thumbnail),
            PathBuf::from("/srv/media/thumbs/68/49/dQw4w9WgXcQ.jpg")
        );
    }

    #[test]
    fn prefix_normalisation() {
        assert_eq!(normalize_prefix(None), "");
        assert_eq!(normalize_prefix(Some("")), "");
        assert_eq!(normalize_prefix(Some("videos")), "videos/");
        assert_eq!(normalize_prefix(Some("videos/")), "videos/");
        assert_eq!(normalize_prefix(Some("a/b")), "a/b/");
    }

    #[test]
    fn remote_keys_are_flat() {
        let id = id("dQw4w9WgXcQ");
        assert_eq!(remote_key("", &id, AssetKind::Video), "dQw4w9WgXcQ.mkv");
        assert_eq!(
            remote_key("videos/", &id, AssetKind::Thumbnail),
            "videos/dQw4w9WgXcQ.jpg"
        );
    }

    #[test]
    fn parse_remote_key_requires_direct_child() {
        let (parsed, kind) = parse_remote_key("videos/", "videos/dQw4w9WgXcQ.mkv").unwrap();
        assert_eq!(parsed, id("dQw4w9WgXcQ"));
        assert_eq!(kind, AssetKind::Video);

        assert!(parse_remote_key("videos/", "videos/old/dQw4w9WgXcQ.mkv").is_none());
        assert!(parse_remote_key("videos/", "other/dQw4w9WgXcQ.mkv").is_none());
        assert!(parse_remote_key("", "dQw4w9WgXcQ.txt").is_none());
    }
}
