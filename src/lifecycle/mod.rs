//! Cache lifecycle orchestration
//!
//! Sequences the broker, device, and mirror components across the two
//! job phases. The prepare phase acquires and exposes the mirror; the
//! cleanup phase refreshes it, verifies it, and decides whether the
//! broker should persist or discard the disk.

pub mod state;

pub use state::PhaseState;

use crate::broker::{Acquisition, Broker, DiskGrant};
use crate::config::Config;
use crate::device::DeviceManager;
use crate::error::GitCacheResult;
use crate::metrics::MetricReporter;
use crate::mirror::key::CacheKey;
use crate::mirror::{alternates, GitAuth, MirrorStore};
use crate::observer::{JobOutcome, JobOutcomeObserver};
use crate::retry::{OperationResult, RetryPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of the prepare phase
#[derive(Debug)]
pub enum PrepareOutcome {
    /// The mirror is mounted and exposed; the job can check out from it
    Ready {
        /// Whether this run performed the first-time clone
        hydrated: bool,
        /// Where the mirror lives
        mirror_path: PathBuf,
    },
    /// Another execution is hydrating this key; use an uncached checkout
    /// for this run
    Fallback {
        /// Human-readable reason from the broker
        reason: String,
    },
}

/// Results of the cleanup maintenance pass, in execution order
#[derive(Debug, Clone)]
pub struct MaintenanceReport {
    /// `git fetch --prune` outcome
    pub refresh: OperationResult,
    /// `git gc --auto` outcome
    pub gc: OperationResult,
    /// `git fsck --no-dangling` outcome
    pub fsck: OperationResult,
}

/// Whether the broker should persist the disk, computed once per cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitDecision {
    /// Persist the disk's mutations
    pub should_commit: bool,
    /// Report first-time hydration as complete
    pub hydrated: bool,
}

impl CommitDecision {
    /// Gate the commit on job outcome and mirror health.
    ///
    /// Starts open and is forced closed by: failed or unobservable job
    /// steps (fail-closed), or any maintenance operation that failed or
    /// timed out. Hydration is only reported complete when the commit
    /// goes through; a discarded hydration must not look "ready" to
    /// future jobs.
    pub fn compute(
        job: &JobOutcome,
        maintenance: &MaintenanceReport,
        performed_hydration: bool,
    ) -> Self {
        let should_commit = !job.gates_commit()
            && maintenance.refresh.success
            && maintenance.gc.success
            && maintenance.fsck.success;

        Self {
            should_commit,
            hydrated: should_commit && performed_hydration,
        }
    }
}

/// What cleanup did, for reporting
#[derive(Debug)]
pub struct CleanupReport {
    /// The commit decision sent to the broker
    pub decision: CommitDecision,
    /// Maintenance outcomes feeding that decision
    pub maintenance: MaintenanceReport,
    /// Job outcome feeding that decision
    pub job: JobOutcome,
}

/// Top-level state machine across the two job phases
pub struct Orchestrator {
    config: Config,
    broker: Arc<dyn Broker>,
    device: DeviceManager,
    store: MirrorStore,
}

impl Orchestrator {
    /// Create an orchestrator over the given broker
    pub fn new(config: Config, broker: Arc<dyn Broker>) -> Self {
        Self {
            config,
            broker,
            device: DeviceManager::new(),
            store: MirrorStore::new(),
        }
    }

    /// Pre-job phase: acquire, mount, ensure the mirror, link the
    /// workspace, and persist the lease state for phase two.
    ///
    /// On `HydrationInProgress` this returns `Fallback` immediately; it
    /// never waits or polls. Any failure after acquisition releases the
    /// disk (commit with `should_commit = false`) before propagating.
    pub async fn prepare(
        &self,
        key: &CacheKey,
        repo_url: &str,
        token: &str,
        workspace: Option<&Path>,
    ) -> GitCacheResult<PrepareOutcome> {
        let grant = match self.broker_acquire(key).await? {
            Acquisition::Acquired(grant) => grant,
            Acquisition::InProgress(reason) => {
                info!("Hydration in progress for {}: {}", key, reason);
                return Ok(PrepareOutcome::Fallback { reason });
            }
        };

        let base = &self.config.mount.base_dir;
        let mount_point = key.mount_point(base);
        let mirror_path = key.mirror_path(base);

        let provisioned = self
            .provision(&grant, key, repo_url, token, workspace, &mount_point, &mirror_path)
            .await;

        match provisioned {
            Ok(hydrated) => Ok(PrepareOutcome::Ready {
                hydrated,
                mirror_path,
            }),
            Err(e) => {
                warn!("Provisioning failed for {}, releasing disk: {}", key, e);
                self.release_after_failure(&grant, key, &mount_point).await;
                Err(e)
            }
        }
    }

    async fn provision(
        &self,
        grant: &DiskGrant,
        key: &CacheKey,
        repo_url: &str,
        token: &str,
        workspace: Option<&Path>,
        mount_point: &Path,
        mirror_path: &Path,
    ) -> GitCacheResult<bool> {
        self.device.ensure_formatted(&grant.device).await?;
        self.device.mount(&grant.device, mount_point).await?;

        let auth = GitAuth::new(repo_url, &self.config.git.auth_username, token);
        let retry = RetryPolicy::from_config(&self.config.retry);
        let hydrated = self
            .store
            .ensure_mirror(mirror_path, repo_url, &auth, &retry)
            .await?;

        if let Some(workspace) = workspace {
            alternates::link_workspace(workspace, mirror_path).await?;
        }

        let mut state = PhaseState::new(
            key.clone(),
            repo_url.to_string(),
            grant.expose_id.clone(),
            grant.device.clone(),
            mount_point.to_path_buf(),
            mirror_path.to_path_buf(),
        );
        state.performed_hydration = hydrated;
        state.workspace = workspace.map(Path::to_path_buf);
        state.save().await?;

        Ok(hydrated)
    }

    /// Post-job phase: maintenance, release, commit decision, broker
    /// commit, state removal. Returns `None` when phase one never ran
    /// (or fell back), which is not an error.
    pub async fn cleanup(
        &self,
        key: &CacheKey,
        token: &str,
        observer: &dyn JobOutcomeObserver,
        reporter: &dyn MetricReporter,
    ) -> GitCacheResult<Option<CleanupReport>> {
        let Some(state) = PhaseState::load(key).await? else {
            return Ok(None);
        };

        // Strict order: refresh before GC so the committed state reflects
        // the latest fetch; integrity check last so nothing mutates the
        // mirror between verification and release.
        let maintenance = self.run_maintenance(&state, token).await;
        self.device.unmount(&state.mount_point).await;

        let report = self.finish(state, maintenance, observer, reporter).await?;
        Ok(Some(report))
    }

    async fn run_maintenance(&self, state: &PhaseState, token: &str) -> MaintenanceReport {
        let auth = GitAuth::new(&state.repo_url, &self.config.git.auth_username, token);
        let retry = RetryPolicy::from_config(&self.config.retry);
        let timeouts = &self.config.timeouts;

        let refresh = self
            .store
            .refresh_mirror(
                &state.mirror_path,
                &auth,
                &retry,
                Duration::from_secs(timeouts.refresh_secs),
            )
            .await;
        let gc = self
            .store
            .run_gc(&state.mirror_path, Duration::from_secs(timeouts.gc_secs))
            .await;
        let fsck = self
            .store
            .run_integrity_check(&state.mirror_path, Duration::from_secs(timeouts.fsck_secs))
            .await;

        MaintenanceReport { refresh, gc, fsck }
    }

    async fn finish(
        &self,
        state: PhaseState,
        maintenance: MaintenanceReport,
        observer: &dyn JobOutcomeObserver,
        reporter: &dyn MetricReporter,
    ) -> GitCacheResult<CleanupReport> {
        let job = observer.check_failures().await;
        let decision = CommitDecision::compute(&job, &maintenance, state.performed_hydration);

        if decision.should_commit {
            info!("Committing mirror state for {}", state.key);
        } else {
            info!("Discarding mirror state for {}", state.key);
        }

        if let Err(e) = self
            .broker_commit(
                &state.expose_id,
                &state.key,
                decision.should_commit,
                decision.hydrated,
            )
            .await
        {
            warn!("Sticky disk commit call failed: {}", e);
        }

        state.delete().await?;

        reporter
            .report(
                "cleanup",
                serde_json::json!({
                    "repo": state.key.to_string(),
                    "committed": decision.should_commit,
                    "hydrated": decision.hydrated,
                    "jobFailed": job.gates_commit(),
                    "refreshOk": maintenance.refresh.success,
                    "gcOk": maintenance.gc.success,
                    "fsckOk": maintenance.fsck.success,
                }),
            )
            .await;

        Ok(CleanupReport {
            decision,
            maintenance,
            job,
        })
    }

    async fn release_after_failure(&self, grant: &DiskGrant, key: &CacheKey, mount_point: &Path) {
        self.device.unmount(mount_point).await;

        if let Err(e) = self
            .broker_commit(&grant.expose_id, key, false, false)
            .await
        {
            warn!("Failed to release sticky disk for {}: {}", key, e);
        }
    }

    async fn broker_acquire(&self, key: &CacheKey) -> GitCacheResult<Acquisition> {
        let broker = Arc::clone(&self.broker);
        let key = key.clone();
        tokio::task::spawn_blocking(move || broker.acquire(&key))
            .await
            .map_err(|e| crate::error::GitCacheError::Internal(format!("broker task failed: {}", e)))?
    }

    async fn broker_commit(
        &self,
        expose_id: &str,
        key: &CacheKey,
        should_commit: bool,
        hydrated: bool,
    ) -> GitCacheResult<()> {
        let broker = Arc::clone(&self.broker);
        let key = key.clone();
        let expose_id = expose_id.to_string();
        tokio::task::spawn_blocking(move || {
            broker.commit(&expose_id, &key, should_commit, hydrated)
        })
        .await
        .map_err(|e| crate::error::GitCacheError::Internal(format!("broker task failed: {}", e)))?
    }
}
