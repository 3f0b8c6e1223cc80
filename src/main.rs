//! gitcache - Persistent git mirror cache for CI sticky disks
//!
//! CLI entry point that dispatches to the two job phases.

use clap::Parser;
use console::style;
use gitcache::cli::{Cli, Commands};
use gitcache::config::ConfigManager;
use gitcache::error::GitCacheResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> GitCacheResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug.
    // GITCACHE_VERBOSE=1 forces debug for environments that cannot pass
    // flags through the runner.
    let verbose_env = std::env::var("GITCACHE_VERBOSE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let verbosity = if verbose_env { 2 } else { cli.verbose };
    let filter = match verbosity {
        0 => EnvFilter::new("gitcache=warn"),
        1 => EnvFilter::new("gitcache=info"),
        _ => EnvFilter::new("gitcache=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // Ensure state directories exist
    ConfigManager::ensure_state_dirs().await?;

    // Dispatch to command
    match cli.command {
        Commands::Prepare(args) => gitcache::cli::commands::prepare(args, &config).await,
        Commands::Cleanup(args) => gitcache::cli::commands::cleanup(args, &config).await,
        Commands::Dissociate(args) => gitcache::cli::commands::dissociate(args).await,
        Commands::Status(args) => gitcache::cli::commands::status(args).await,
    }
}
