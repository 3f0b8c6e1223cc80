//! Configuration management for gitcache

pub mod schema;

pub use schema::Config;

use crate::error::{GitCacheError, GitCacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gitcache")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("GITCACHE_STATE_DIR") {
            return PathBuf::from(dir);
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gitcache")
    }

    /// Get the lease state directory path
    pub fn leases_dir() -> PathBuf {
        Self::state_dir().join("leases")
    }

    /// Load configuration, using defaults if no file exists
    pub async fn load(&self) -> GitCacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> GitCacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| GitCacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| GitCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> GitCacheResult<()> {
        let dirs = [Self::state_dir(), Self::leases_dir()];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                GitCacheError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("missing.toml"));

        let config = manager.load().await.unwrap();
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[tokio::test]
    async fn load_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[retry]\nmax_attempts = 2\n")
            .await
            .unwrap();

        let manager = ConfigManager::with_path(path);
        let config = manager.load().await.unwrap();
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[tokio::test]
    async fn load_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "not valid toml [[[").await.unwrap();

        let manager = ConfigManager::with_path(path.clone());
        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, GitCacheError::ConfigInvalid { .. }));
    }

    #[test]
    fn default_config_path_ends_with_toml() {
        let path = ConfigManager::default_config_path();
        assert!(path.ends_with("gitcache/config.toml"));
    }
}
