//! Bare mirror store
//!
//! Owns the mirror-on-disk abstraction: existence check, initial clone
//! ("hydration"), incremental refresh, garbage collection, and integrity
//! verification. The git CLI is the sole execution substrate; every
//! invocation funnels through a single process runner.

pub mod alternates;
pub mod key;

pub use key::{CacheKey, SCHEMA_VERSION};

use crate::error::{GitCacheError, GitCacheResult};
use crate::retry::{timeboxed, OperationResult, RetryPolicy};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

/// Per-request git credential, passed as a config override rather than
/// embedded in the URL.
///
/// The encoded header is a secret: `Debug` redacts it and it must never
/// be written to logs.
#[derive(Clone)]
pub struct GitAuth {
    origin: String,
    header: String,
}

impl GitAuth {
    /// Build a credential for `repo_url` from a username/token pair
    pub fn new(repo_url: &str, username: &str, token: &str) -> Self {
        let encoded = STANDARD.encode(format!("{}:{}", username, token));
        Self {
            origin: url_origin(repo_url),
            header: format!("AUTHORIZATION: basic {}", encoded),
        }
    }

    /// The `git -c` override scoping this credential to its origin
    fn config_arg(&self) -> String {
        format!("http.{}.extraheader={}", self.origin, self.header)
    }
}

impl fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitAuth")
            .field("origin", &self.origin)
            .field("header", &"<redacted>")
            .finish()
    }
}

/// Extract `scheme://host[:port]` from a repository URL
fn url_origin(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            match rest.find('/') {
                Some(host_end) => url[..scheme_end + 3 + host_end].to_string(),
                None => url.to_string(),
            }
        }
        None => url.to_string(),
    }
}

/// Bare-mirror-on-disk operations
pub struct MirrorStore;

impl MirrorStore {
    /// Create a mirror store
    pub fn new() -> Self {
        Self
    }

    /// Whether a complete mirror exists at `mirror_path`
    pub fn exists(mirror_path: &Path) -> bool {
        mirror_path.join("HEAD").is_file()
    }

    /// Ensure a mirror exists at `mirror_path`, hydrating if absent.
    ///
    /// Returns `true` when this call performed the first-time clone. When
    /// a mirror is already present this is a no-op: refreshing is deferred
    /// to the post-job phase so the hot checkout path never pays fetch
    /// latency, and a stale mirror still serves as a valid alternate
    /// object source.
    pub async fn ensure_mirror(
        &self,
        mirror_path: &Path,
        repo_url: &str,
        auth: &GitAuth,
        retry: &RetryPolicy,
    ) -> GitCacheResult<bool> {
        if Self::exists(mirror_path) {
            debug!("Mirror present at {}, refresh deferred", mirror_path.display());
            return Ok(false);
        }

        if let Some(parent) = mirror_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GitCacheError::io("creating mirror parent directory", e))?;
        }

        info!("Hydrating mirror at {}", mirror_path.display());
        retry
            .run("clone --mirror", || self.clone_attempt(mirror_path, repo_url, auth))
            .await?;

        Ok(true)
    }

    /// One clone attempt. Clears any partial mirror left by a previous
    /// failed attempt first, and removes its own partial output on
    /// failure, so a mirror either exists completely or not at all.
    async fn clone_attempt(
        &self,
        mirror_path: &Path,
        repo_url: &str,
        auth: &GitAuth,
    ) -> GitCacheResult<()> {
        if mirror_path.exists() {
            debug!("Clearing partial mirror at {}", mirror_path.display());
            fs::remove_dir_all(mirror_path)
                .await
                .map_err(|e| GitCacheError::io("clearing partial mirror", e))?;
        }

        let target = mirror_path.to_string_lossy().to_string();
        let result = self
            .run_git(
                "clone",
                auth,
                &["clone", "--mirror", repo_url, &target],
            )
            .await;

        if result.is_err() && mirror_path.exists() {
            let _ = fs::remove_dir_all(mirror_path).await;
        }
        result
    }

    /// Fetch new refs and prune deleted ones from origin.
    ///
    /// Runs under both the retry policy and a hard wall-clock deadline so
    /// a hung fetch cannot stall the cleanup phase. No-ops successfully if
    /// the mirror does not exist.
    pub async fn refresh_mirror(
        &self,
        mirror_path: &Path,
        auth: &GitAuth,
        retry: &RetryPolicy,
        deadline: Duration,
    ) -> OperationResult {
        if !Self::exists(mirror_path) {
            debug!("No mirror at {}, skipping refresh", mirror_path.display());
            return OperationResult::ok();
        }

        let dir = mirror_path.to_string_lossy().to_string();
        timeboxed("refresh", deadline, async {
            retry
                .run("fetch --prune", || async {
                    self.run_git("fetch", auth, &["-C", &dir, "fetch", "--prune", "origin"])
                        .await
                })
                .await
        })
        .await
    }

    /// Threshold-gated garbage collection.
    ///
    /// `gc --auto` only repacks when loose-object or pack counts cross
    /// git's thresholds; this runs on every cleanup and must not become
    /// the dominant cost.
    pub async fn run_gc(&self, mirror_path: &Path, deadline: Duration) -> OperationResult {
        let dir = mirror_path.to_string_lossy().to_string();
        timeboxed("gc", deadline, async {
            self.run_git_unauthenticated(&["-C", &dir, "gc", "--auto"], "gc")
                .await
        })
        .await
    }

    /// Verify the object graph is structurally sound.
    ///
    /// Dangling objects are ignored: a pruned mirror legitimately has
    /// them. This is the last gate before the disk is committed.
    pub async fn run_integrity_check(
        &self,
        mirror_path: &Path,
        deadline: Duration,
    ) -> OperationResult {
        let dir = mirror_path.to_string_lossy().to_string();
        timeboxed("fsck", deadline, async {
            self.run_git_unauthenticated(&["-C", &dir, "fsck", "--no-dangling"], "fsck")
                .await
        })
        .await
    }

    /// Run git with the per-origin credential override prepended.
    ///
    /// The credential never appears in logs; only the operation name is
    /// logged.
    async fn run_git(&self, op: &str, auth: &GitAuth, args: &[&str]) -> GitCacheResult<()> {
        let config_arg = auth.config_arg();
        let mut full_args = vec!["-c", config_arg.as_str()];
        full_args.extend_from_slice(args);
        self.run_git_unauthenticated(&full_args, op).await
    }

    async fn run_git_unauthenticated(&self, args: &[&str], op: &str) -> GitCacheResult<()> {
        debug!("Running git {}", op);

        let output = Command::new("git")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GitCacheError::command_failed(format!("git {}", op), e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(GitCacheError::mirror(op, stderr.trim().to_string()))
        }
    }
}

impl Default for MirrorStore {
    fn default() -> Self {
        Self::new()
    }
}
