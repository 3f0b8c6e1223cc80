//! Cross-phase lease state persistence
//!
//! A job runs this tool twice: `prepare` before the user's steps and
//! `cleanup` after. The lease acquired in phase one must be carried to
//! phase two, so it is serialized to a state file keyed by the cache-key
//! digest. The file is the only channel between the two invocations;
//! `cleanup` consumes and deletes it.

use crate::config::ConfigManager;
use crate::error::{GitCacheError, GitCacheResult};
use crate::mirror::key::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

/// Everything `cleanup` needs from `prepare`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    /// Unique id for this job run
    pub run_id: Uuid,

    /// The cached repository
    pub key: CacheKey,

    /// Clone/fetch URL for the repository
    pub repo_url: String,

    /// Opaque broker handle, round-tripped unmodified to commit
    pub expose_id: String,

    /// Block device the broker granted
    pub device: String,

    /// Where the device is mounted
    pub mount_point: PathBuf,

    /// Bare mirror location on the mounted device
    pub mirror_path: PathBuf,

    /// Whether this run performed the first-time clone
    pub performed_hydration: bool,

    /// Workspace linked to the mirror, if any
    pub workspace: Option<PathBuf>,

    /// When the lease was acquired
    pub created_at: DateTime<Utc>,

    /// When the state was last written
    pub updated_at: DateTime<Utc>,
}

impl PhaseState {
    /// Create state for a freshly acquired lease
    pub fn new(
        key: CacheKey,
        repo_url: String,
        expose_id: String,
        device: String,
        mount_point: PathBuf,
        mirror_path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            key,
            repo_url,
            expose_id,
            device,
            mount_point,
            mirror_path,
            performed_hydration: false,
            workspace: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// State file path for a cache key
    pub fn file_path(key: &CacheKey) -> PathBuf {
        ConfigManager::leases_dir().join(format!("{}.json", key.digest()))
    }

    /// Load state for a cache key, if phase one ran
    pub async fn load(key: &CacheKey) -> GitCacheResult<Option<Self>> {
        let path = Self::file_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| GitCacheError::io(format!("reading lease state {}", path.display()), e))?;

        let state: PhaseState = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    /// Save state to the lease file
    pub async fn save(&self) -> GitCacheResult<()> {
        let path = Self::file_path(&self.key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GitCacheError::io("creating leases directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| GitCacheError::io(format!("writing lease state {}", path.display()), e))?;

        Ok(())
    }

    /// Delete the lease file once the lease is committed or discarded
    pub async fn delete(&self) -> GitCacheResult<()> {
        let path = Self::file_path(&self.key);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| GitCacheError::io(format!("deleting lease state {}", path.display()), e))?;
        }
        Ok(())
    }

    /// Touch the update timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
