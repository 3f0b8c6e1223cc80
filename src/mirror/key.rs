//! Cache key and on-disk layout derivation
//!
//! A cache key is an `(owner, repository)` pair. Everything the key names
//! on disk is directory-segmented so distinct pairs can never collide,
//! with one exception: the mirror filename itself stays flat
//! (`{owner}-{repo}.git`) for compatibility with mirrors created before
//! per-repo mount points existed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// On-disk mirror layout version, bumped when the tree layout changes
pub const SCHEMA_VERSION: &str = "v1";

/// Identifies one cached repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Repository owner (organization or user)
    pub owner: String,
    /// Repository name
    pub repo: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// The broker-facing key for this repository
    pub fn sticky_disk_key(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Mount point for this repository's sticky disk.
    ///
    /// Segmented as `{base}/{owner}/{repo}` rather than concatenated, so
    /// `foo-bar/baz` and `foo/bar-baz` map to different directories.
    pub fn mount_point(&self, base: &Path) -> PathBuf {
        base.join(&self.owner).join(&self.repo)
    }

    /// Path of the bare mirror on the mounted disk
    pub fn mirror_path(&self, base: &Path) -> PathBuf {
        self.mount_point(base)
            .join(SCHEMA_VERSION)
            .join(format!("{}-{}.git", self.owner, self.repo))
    }

    /// Short content digest of the key, used to name the lease state file
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sticky_disk_key().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..6])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_point_is_deterministic() {
        let key = CacheKey::new("acme", "widgets");
        let base = Path::new("/mnt/cache");
        assert_eq!(key.mount_point(base), key.mount_point(base));
        assert_eq!(key.mirror_path(base), key.mirror_path(base));
    }

    #[test]
    fn mount_point_segments_by_directory() {
        let base = Path::new("/mnt/cache");
        let a = CacheKey::new("foo-bar", "baz");
        let b = CacheKey::new("foo", "bar-baz");

        assert_eq!(a.mount_point(base), Path::new("/mnt/cache/foo-bar/baz"));
        assert_eq!(b.mount_point(base), Path::new("/mnt/cache/foo/bar-baz"));
        assert_ne!(a.mount_point(base), b.mount_point(base));
        assert_ne!(a.mirror_path(base), b.mirror_path(base));
    }

    #[test]
    fn mirror_path_is_under_mount_point() {
        let base = Path::new("/mnt/cache");
        let key = CacheKey::new("acme", "widgets");

        let mirror = key.mirror_path(base);
        assert!(mirror.starts_with(key.mount_point(base)));

        let name = mirror.file_name().unwrap().to_string_lossy();
        assert!(name.contains("acme"));
        assert!(name.contains("widgets"));
        assert!(name.ends_with(".git"));
    }

    #[test]
    fn mirror_path_carries_schema_version() {
        let key = CacheKey::new("acme", "widgets");
        let mirror = key.mirror_path(Path::new("/mnt/cache"));
        assert_eq!(
            mirror,
            Path::new("/mnt/cache/acme/widgets/v1/acme-widgets.git")
        );
    }

    #[test]
    fn digest_is_stable_and_short() {
        let key = CacheKey::new("acme", "widgets");
        assert_eq!(key.digest(), key.digest());
        assert_eq!(key.digest().len(), 12);
    }

    #[test]
    fn digest_distinguishes_keys() {
        let a = CacheKey::new("foo-bar", "baz");
        let b = CacheKey::new("foo", "bar-baz");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn display_matches_sticky_disk_key() {
        let key = CacheKey::new("acme", "widgets");
        assert_eq!(key.to_string(), "acme/widgets");
        assert_eq!(key.sticky_disk_key(), "acme/widgets");
    }
}
