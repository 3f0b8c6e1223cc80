//! Prepare command - acquire the sticky disk and expose the mirror
//!
//! Runs before the job's checkout step. Every failure on this path ends
//! with a fallback notice and a zero exit: the job must never fail
//! because the cache failed.

use crate::broker::BrokerClient;
use crate::cli::args::PrepareArgs;
use crate::config::Config;
use crate::error::GitCacheResult;
use crate::lifecycle::{Orchestrator, PrepareOutcome};
use crate::mirror::key::CacheKey;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Execute the prepare command
pub async fn execute(args: PrepareArgs, config: &Config) -> GitCacheResult<()> {
    let identity = match args.agent.identity() {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            println!(
                "{} No VM identifier in this environment; git mirror cache disabled",
                style("!").yellow()
            );
            return Ok(());
        }
        Err(e) => {
            warn!("Mirror cache misconfigured: {}", e);
            println!(
                "{} Mirror cache misconfigured ({}); falling back to uncached checkout",
                style("!").yellow(),
                e
            );
            return Ok(());
        }
    };

    let key = CacheKey::new(&args.owner, &args.repo);
    let repo_url = args.repo_url();
    let token = identity.token.clone();
    debug!("Preparing mirror cache for {}", key);

    let broker = Arc::new(BrokerClient::new(
        &args.agent.agent_addr,
        args.agent.broker_port,
        identity,
        Duration::from_secs(config.timeouts.broker_secs),
    ));
    let orchestrator = Orchestrator::new(config.clone(), broker);

    let pb = create_progress_bar(&format!("Preparing mirror for {}...", key));

    let outcome = orchestrator
        .prepare(&key, &repo_url, &token, args.workspace.as_deref())
        .await;
    pb.finish_and_clear();

    match outcome {
        Ok(PrepareOutcome::Ready {
            hydrated,
            mirror_path,
        }) => {
            let verb = if hydrated { "hydrated" } else { "ready" };
            println!(
                "{} Mirror {} at {}",
                style("✓").green(),
                verb,
                style(mirror_path.display()).cyan()
            );
            Ok(())
        }
        Ok(PrepareOutcome::Fallback { reason }) => {
            println!(
                "{} Mirror busy ({}); falling back to uncached checkout",
                style("!").yellow(),
                reason
            );
            Ok(())
        }
        Err(e) => {
            warn!("Mirror cache unavailable for {}: {}", key, e);
            let what = if e.is_fallback() {
                "Mirror cache unavailable"
            } else {
                "Mirror setup failed"
            };
            println!(
                "{} {} ({}); falling back to uncached checkout",
                style("!").yellow(),
                what,
                e
            );
            Ok(())
        }
    }
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
