//! Cleanup command - refresh, verify, and release the mirror
//!
//! Runs after the job's own steps have finished. Failures here are
//! logged and swallowed; an otherwise-successful job must not be failed
//! by its cache cleanup. The one consequence of failure is that the
//! disk's mutations are discarded instead of committed.

use crate::broker::BrokerClient;
use crate::cli::args::CleanupArgs;
use crate::config::Config;
use crate::error::GitCacheResult;
use crate::lifecycle::Orchestrator;
use crate::metrics::AgentReporter;
use crate::mirror::key::CacheKey;
use crate::observer::AgentObserver;
use console::style;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Execute the cleanup command
pub async fn execute(args: CleanupArgs, config: &Config) -> GitCacheResult<()> {
    let identity = match args.agent.identity() {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            println!(
                "{} No VM identifier in this environment; nothing to clean up",
                style("!").yellow()
            );
            return Ok(());
        }
        Err(e) => {
            warn!("Mirror cache misconfigured (continuing): {}", e);
            println!(
                "{} Mirror cache misconfigured ({}); nothing to clean up",
                style("!").yellow(),
                e
            );
            return Ok(());
        }
    };

    let key = CacheKey::new(&args.owner, &args.repo);
    let token = identity.token.clone();
    debug!("Cleaning up mirror cache for {}", key);

    let request_timeout = Duration::from_secs(config.timeouts.broker_secs);
    let observer = AgentObserver::new(
        &args.agent.agent_addr,
        args.agent.broker_port,
        &identity.vm_id,
        &token,
        request_timeout,
    );
    let reporter = AgentReporter::new(
        &args.agent.agent_addr,
        args.agent.broker_port,
        &identity.vm_id,
        &token,
        request_timeout,
    );
    let broker = Arc::new(BrokerClient::new(
        &args.agent.agent_addr,
        args.agent.broker_port,
        identity,
        request_timeout,
    ));
    let orchestrator = Orchestrator::new(config.clone(), broker);

    match orchestrator.cleanup(&key, &token, &observer, &reporter).await {
        Ok(None) => {
            println!(
                "{} No mirror lease for {}; nothing to clean up",
                style("!").yellow(),
                style(&key).cyan()
            );
            Ok(())
        }
        Ok(Some(report)) => {
            if report.decision.should_commit {
                println!(
                    "{} Mirror state for {} committed",
                    style("✓").green(),
                    style(&key).cyan()
                );
            } else {
                println!(
                    "{} Mirror state for {} discarded",
                    style("!").yellow(),
                    style(&key).cyan()
                );
                for (name, result) in [
                    ("refresh", &report.maintenance.refresh),
                    ("gc", &report.maintenance.gc),
                    ("fsck", &report.maintenance.fsck),
                ] {
                    if let Some(ref error) = result.error {
                        let kind = if result.timed_out { "timed out" } else { "failed" };
                        println!("  {} {}: {}", style(kind).dim(), name, error);
                    }
                }
                if report.job.has_failures {
                    println!(
                        "  {} job reported {} failed step(s)",
                        style("failed").dim(),
                        report.job.failed_count
                    );
                } else if let Some(ref reason) = report.job.error {
                    println!("  {} job outcome unavailable: {}", style("failed").dim(), reason);
                }
            }
            Ok(())
        }
        Err(e) => {
            warn!("Cleanup failed for {} (continuing): {}", key, e);
            println!(
                "{} Mirror cleanup failed ({}); disk left uncommitted",
                style("!").yellow(),
                e
            );
            Ok(())
        }
    }
}
