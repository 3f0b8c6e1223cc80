//! Dissociate command - make a linked workspace self-contained

use crate::cli::args::DissociateArgs;
use crate::error::GitCacheResult;
use crate::mirror::alternates;
use console::style;

/// Execute the dissociate command
pub async fn execute(args: DissociateArgs) -> GitCacheResult<()> {
    alternates::dissociate(&args.workspace).await?;

    println!(
        "{} Workspace {} is self-contained",
        style("✓").green(),
        style(args.workspace.display()).cyan()
    );
    Ok(())
}
