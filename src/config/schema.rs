//! Configuration schema for gitcache
//!
//! Tunables are stored at `~/.config/gitcache/config.toml`. Identity and
//! credentials (agent address, VM id, token) come from CLI flags and
//! environment variables, not from this file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mount layout settings
    pub mount: MountConfig,

    /// Bounded retry policy for network-facing git operations
    pub retry: RetryConfig,

    /// Wall-clock deadlines for maintenance operations
    pub timeouts: TimeoutConfig,

    /// Git invocation settings
    pub git: GitConfig,
}

/// Mount layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Base directory under which per-repo mount points are created
    pub base_dir: PathBuf,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/var/lib/gitcache/mnt"),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts for clone/fetch before giving up
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds (doubles per attempt)
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
        }
    }
}

/// Per-operation wall-clock deadlines, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for `git fetch --prune` during cleanup
    pub refresh_secs: u64,

    /// Deadline for `git gc --auto`
    pub gc_secs: u64,

    /// Deadline for `git fsck --no-dangling`
    pub fsck_secs: u64,

    /// Deadline for each broker RPC request
    pub broker_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 180,
            gc_secs: 300,
            fsck_secs: 300,
            broker_secs: 30,
        }
    }
}

/// Git invocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Username paired with the bearer token in the basic auth header
    pub auth_username: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            auth_username: "x-access-token".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.mount.base_dir, PathBuf::from("/var/lib/gitcache/mnt"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.timeouts.gc_secs, 300);
        assert_eq!(config.git.auth_username, "x-access-token");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [timeouts]
            refresh_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.timeouts.refresh_secs, 60);
        assert_eq!(config.timeouts.gc_secs, 300);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn roundtrip_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.retry.initial_delay_ms, config.retry.initial_delay_ms);
    }
}
