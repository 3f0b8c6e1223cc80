//! CLI argument definitions using clap derive

use crate::broker::BrokerIdentity;
use crate::error::{GitCacheError, GitCacheResult};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// gitcache - Persistent git mirror cache for CI sticky disks
///
/// Keeps a bare mirror of a repository on a durable block device shared
/// across job runs. Run `prepare` before the job's checkout step and
/// `cleanup` after the job finishes.
#[derive(Parser, Debug)]
#[command(name = "gitcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "GITCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire the sticky disk and expose the mirror (pre-job phase)
    Prepare(PrepareArgs),

    /// Refresh, verify, and release the mirror (post-job phase)
    Cleanup(CleanupArgs),

    /// Make a linked workspace self-contained
    Dissociate(DissociateArgs),

    /// Show the persisted lease state for a repository
    Status(StatusArgs),
}

/// Agent/broker identity, from flags or the environment
#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Network address of the VM agent hosting the broker
    #[arg(long, env = "GITCACHE_AGENT_ADDR", default_value = "192.168.127.1")]
    pub agent_addr: String,

    /// Broker RPC port on the agent
    #[arg(long, env = "GITCACHE_BROKER_PORT", default_value_t = 5556)]
    pub broker_port: u16,

    /// Region identifier passed through to the broker
    #[arg(long, env = "GITCACHE_REGION")]
    pub region: Option<String>,

    /// Installation model identifier passed through to the broker
    #[arg(long, env = "GITCACHE_INSTALLATION_ID")]
    pub installation_id: Option<String>,

    /// VM identifier; absence means this environment has no sticky disks
    #[arg(long, env = "GITCACHE_VM_ID")]
    pub vm_id: Option<String>,

    /// Bearer token for the broker and for git over HTTPS
    #[arg(long, env = "GITCACHE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl AgentArgs {
    /// Resolve the broker identity.
    ///
    /// `Ok(None)` means no VM identifier is present: this environment has
    /// no sticky disks and the whole subsystem is bypassed. A present VM
    /// identifier with missing companions is a configuration error.
    pub fn identity(&self) -> GitCacheResult<Option<BrokerIdentity>> {
        let Some(vm_id) = self.vm_id.clone() else {
            return Ok(None);
        };

        let region = self
            .region
            .clone()
            .ok_or(GitCacheError::ConfigMissing("GITCACHE_REGION"))?;
        let installation_id = self
            .installation_id
            .clone()
            .ok_or(GitCacheError::ConfigMissing("GITCACHE_INSTALLATION_ID"))?;
        let token = self
            .token
            .clone()
            .ok_or(GitCacheError::ConfigMissing("GITCACHE_TOKEN"))?;

        Ok(Some(BrokerIdentity {
            region,
            installation_id,
            vm_id,
            token,
        }))
    }
}

/// Arguments for the prepare command
#[derive(Parser, Debug)]
pub struct PrepareArgs {
    /// Repository owner (organization or user)
    #[arg(long)]
    pub owner: String,

    /// Repository name
    #[arg(long)]
    pub repo: String,

    /// Clone URL (defaults to GitHub over HTTPS)
    #[arg(long)]
    pub url: Option<String>,

    /// Workspace to link to the mirror via git alternates
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    #[command(flatten)]
    pub agent: AgentArgs,
}

impl PrepareArgs {
    /// Clone URL, defaulting to GitHub over HTTPS
    pub fn repo_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("https://github.com/{}/{}.git", self.owner, self.repo))
    }
}

/// Arguments for the cleanup command
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Repository owner (organization or user)
    #[arg(long)]
    pub owner: String,

    /// Repository name
    #[arg(long)]
    pub repo: String,

    #[command(flatten)]
    pub agent: AgentArgs,
}

/// Arguments for the dissociate command
#[derive(Parser, Debug)]
pub struct DissociateArgs {
    /// Workspace whose objects should be copied locally
    #[arg(long)]
    pub workspace: PathBuf,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Repository owner (organization or user)
    #[arg(long)]
    pub owner: String,

    /// Repository name
    #[arg(long)]
    pub repo: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_default_url() {
        let cli = Cli::parse_from([
            "gitcache", "prepare", "--owner", "acme", "--repo", "widgets",
        ]);
        match cli.command {
            Commands::Prepare(args) => {
                assert_eq!(args.repo_url(), "https://github.com/acme/widgets.git");
            }
            other => panic!("expected prepare, got {:?}", other),
        }
    }

    #[test]
    fn prepare_explicit_url_wins() {
        let cli = Cli::parse_from([
            "gitcache",
            "prepare",
            "--owner",
            "acme",
            "--repo",
            "widgets",
            "--url",
            "https://git.internal/acme/widgets.git",
        ]);
        match cli.command {
            Commands::Prepare(args) => {
                assert_eq!(args.repo_url(), "https://git.internal/acme/widgets.git");
            }
            other => panic!("expected prepare, got {:?}", other),
        }
    }

    fn agent_args(vm_id: Option<&str>) -> AgentArgs {
        AgentArgs {
            agent_addr: "192.168.127.1".to_string(),
            broker_port: 5556,
            region: Some("us-east-1".to_string()),
            installation_id: Some("inst-1".to_string()),
            vm_id: vm_id.map(str::to_string),
            token: Some("tok".to_string()),
        }
    }

    #[test]
    fn identity_absent_without_vm_id() {
        assert!(agent_args(None).identity().unwrap().is_none());
    }

    #[test]
    fn identity_present_with_vm_id() {
        let identity = agent_args(Some("vm-42")).identity().unwrap().unwrap();
        assert_eq!(identity.vm_id, "vm-42");
        assert_eq!(identity.region, "us-east-1");
    }

    #[test]
    fn identity_requires_token() {
        let mut args = agent_args(Some("vm-42"));
        args.token = None;
        let err = args.identity().unwrap_err();
        assert!(matches!(err, GitCacheError::ConfigMissing("GITCACHE_TOKEN")));
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::parse_from([
            "gitcache", "-vv", "status", "--owner", "a", "--repo", "b",
        ]);
        assert_eq!(cli.verbose, 2);
    }
}
