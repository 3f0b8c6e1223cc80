//! Block device formatting and mounting
//!
//! Pure OS-resource management for the sticky disk: detect or create a
//! filesystem on the granted device, mount it at the per-repo mount
//! point, and release it with a sync + unmount. Release-path failures are
//! logged and swallowed; they must never fail a job whose real work
//! already succeeded.

use crate::error::{GitCacheError, GitCacheResult};
use std::path::Path;
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Manages the sticky disk's filesystem and mount lifecycle
pub struct DeviceManager;

impl DeviceManager {
    /// Create a device manager
    pub fn new() -> Self {
        Self
    }

    /// Make sure `device` carries a filesystem.
    ///
    /// An existing filesystem is resized to fill the full device (the
    /// broker may have grown it since the last format); resize failure is
    /// a non-fatal warning. A blank device is formatted with a lazy-init
    /// profile so the first mount is fast.
    pub async fn ensure_formatted(&self, device: &str) -> GitCacheResult<()> {
        let output = self
            .exec("blkid", &["-o", "value", "-s", "TYPE", device])
            .await?;
        let fs_type = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if output.status.success() && !fs_type.is_empty() {
            debug!("Device {} already formatted as {}", device, fs_type);
            let resize = self.exec("resize2fs", &[device]).await?;
            if !resize.status.success() {
                let stderr = String::from_utf8_lossy(&resize.stderr);
                warn!("resize2fs {} failed (continuing): {}", device, stderr.trim());
            }
            return Ok(());
        }

        info!("Formatting {} (ext4, lazy init)", device);
        let mkfs = self
            .exec(
                "mkfs.ext4",
                &[
                    "-m0",
                    "-E",
                    "lazy_itable_init=1,lazy_journal_init=1",
                    device,
                ],
            )
            .await?;

        if mkfs.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&mkfs.stderr);
            Err(GitCacheError::filesystem(
                format!("formatting {}", device),
                stderr.trim().to_string(),
            ))
        }
    }

    /// Mount `device` at `mount_point`, creating the directory first
    pub async fn mount(&self, device: &str, mount_point: &Path) -> GitCacheResult<()> {
        fs::create_dir_all(mount_point)
            .await
            .map_err(|e| GitCacheError::io("creating mount point", e))?;

        let target = mount_point.to_string_lossy().to_string();
        let output = self.exec("mount", &[device, &target]).await?;

        if output.status.success() {
            info!("Mounted {} at {}", device, mount_point.display());
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(GitCacheError::filesystem(
                format!("mounting {} at {}", device, mount_point.display()),
                stderr.trim().to_string(),
            ))
        }
    }

    /// Flush pending writes and unmount.
    ///
    /// Failures here are logged and swallowed: the job's own work already
    /// succeeded, and the only risk is the next job seeing a busy mount,
    /// which its own acquire/mount must tolerate.
    pub async fn unmount(&self, mount_point: &Path) {
        match self.exec("sync", &[]).await {
            Ok(output) if !output.status.success() => {
                warn!("sync exited nonzero before unmount");
            }
            Err(e) => warn!("sync failed before unmount: {}", e),
            _ => {}
        }

        let target = mount_point.to_string_lossy().to_string();
        match self.exec("umount", &[&target]).await {
            Ok(output) if output.status.success() => {
                info!("Unmounted {}", mount_point.display());
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    "umount {} failed (continuing): {}",
                    mount_point.display(),
                    stderr.trim()
                );
            }
            Err(e) => warn!("umount {} failed (continuing): {}", mount_point.display(), e),
        }
    }

    async fn exec(&self, program: &str, args: &[&str]) -> GitCacheResult<std::process::Output> {
        debug!("Executing: {} {:?}", program, args);

        Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GitCacheError::command_failed(format!("{} {:?}", program, args), e))
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
