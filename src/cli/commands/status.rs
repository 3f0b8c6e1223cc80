//! Status command - show the persisted lease state for a repository

use crate::cli::args::StatusArgs;
use crate::error::{GitCacheError, GitCacheResult};
use crate::lifecycle::PhaseState;
use crate::mirror::key::CacheKey;
use console::style;

/// Execute the status command
pub async fn execute(args: StatusArgs) -> GitCacheResult<()> {
    let key = CacheKey::new(&args.owner, &args.repo);

    let state = PhaseState::load(&key)
        .await?
        .ok_or_else(|| GitCacheError::LeaseNotFound(key.to_string()))?;

    println!("Lease for {}", style(&key).cyan());
    println!("  run id:     {}", state.run_id);
    println!("  expose id:  {}", state.expose_id);
    println!("  device:     {}", state.device);
    println!("  mounted at: {}", state.mount_point.display());
    println!("  mirror:     {}", state.mirror_path.display());
    println!("  hydrated:   {}", state.performed_hydration);
    if let Some(ref workspace) = state.workspace {
        println!("  workspace:  {}", workspace.display());
    }
    println!("  acquired:   {}", state.created_at.to_rfc3339());

    Ok(())
}
