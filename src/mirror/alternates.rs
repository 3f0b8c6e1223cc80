//! Object aliasing between a job workspace and the mirror
//!
//! Linking writes a git alternates file so the workspace resolves objects
//! straight out of the mirror's object store without copying. Dissociating
//! reverses that for execution environments that cannot see the mirror
//! mount, at the cost of copying every referenced object locally.

use crate::error::{GitCacheError, GitCacheResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

/// Path of the alternates file inside a workspace
pub fn alternates_path(workspace: &Path) -> PathBuf {
    workspace.join(".git").join("objects").join("info").join("alternates")
}

/// Point the workspace's object store at the mirror's.
///
/// Pure file write with directory creation; no retry needed.
pub async fn link_workspace(workspace: &Path, mirror_path: &Path) -> GitCacheResult<()> {
    let path = alternates_path(workspace);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| GitCacheError::io("creating objects/info directory", e))?;
    }

    let line = format!("{}\n", mirror_path.join("objects").display());
    fs::write(&path, line)
        .await
        .map_err(|e| GitCacheError::io(format!("writing {}", path.display()), e))?;

    debug!(
        "Linked {} to mirror objects at {}",
        workspace.display(),
        mirror_path.display()
    );
    Ok(())
}

/// Copy alternates-referenced objects into the workspace and remove the
/// link, producing a self-contained checkout.
///
/// No-op if the workspace has no alternates file.
pub async fn dissociate(workspace: &Path) -> GitCacheResult<()> {
    if !workspace.join(".git").is_dir() {
        return Err(GitCacheError::WorkspaceInvalid(workspace.to_path_buf()));
    }

    let path = alternates_path(workspace);
    if !path.exists() {
        debug!("No alternates file at {}, nothing to dissociate", path.display());
        return Ok(());
    }

    info!("Dissociating {} from its mirror", workspace.display());
    let output = Command::new("git")
        .args(["-C"])
        .arg(workspace)
        .args(["repack", "-a", "-d"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| GitCacheError::command_failed("git repack", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitCacheError::mirror("repack", stderr.trim().to_string()));
    }

    fs::remove_file(&path)
        .await
        .map_err(|e| GitCacheError::io(format!("removing {}", path.display()), e))?;

    Ok(())
}
