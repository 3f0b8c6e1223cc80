//! Sticky disk broker client
//!
//! Speaks HTTP/JSON to the volume-provisioning agent on the local network.
//! The broker is the source of truth for disk ownership: mutual exclusion
//! for first-time hydration is enforced on its side, and a losing acquirer
//! is told the hydration is in progress rather than being made to wait.

use crate::error::{GitCacheError, GitCacheResult};
use crate::mirror::key::CacheKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Sticky disk type requested for git mirrors
const STICKY_DISK_TYPE: &str = "gitmirror";

/// Broker status code for "another execution holds the hydration lock"
const CODE_HYDRATION_IN_PROGRESS: &str = "hydration_in_progress";

/// Outcome of a disk acquisition attempt
#[derive(Debug, Clone)]
pub enum Acquisition {
    /// The broker granted the disk to this execution
    Acquired(DiskGrant),
    /// Another execution is hydrating this key; fall back to an uncached
    /// checkout for this run. Not an error.
    InProgress(String),
}

/// A granted disk, before it is mounted
#[derive(Debug, Clone)]
pub struct DiskGrant {
    /// Opaque handle round-tripped unmodified to the later commit call
    pub expose_id: String,
    /// Block device identifier, e.g. `/dev/vdb`
    pub device: String,
}

/// Identity and credentials passed through to the broker verbatim
#[derive(Debug, Clone)]
pub struct BrokerIdentity {
    pub region: String,
    pub installation_id: String,
    pub vm_id: String,
    pub token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcquireRequest<'a> {
    sticky_disk_key: &'a str,
    sticky_disk_type: &'a str,
    region: &'a str,
    installation_model_id: &'a str,
    vm_id: &'a str,
    repo_name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcquireResponse {
    expose_id: Option<String>,
    device_name: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest<'a> {
    expose_id: &'a str,
    sticky_disk_key: &'a str,
    vm_id: &'a str,
    should_commit: bool,
    repo_name: &'a str,
    vm_hydrated_git_mirror: bool,
}

/// Broker operations the cache lifecycle depends on.
///
/// Abstracted so the lifecycle can be exercised against a recording
/// implementation; the real broker lives behind [`BrokerClient`].
pub trait Broker: Send + Sync {
    /// Request a durable disk for `key`
    fn acquire(&self, key: &CacheKey) -> GitCacheResult<Acquisition>;

    /// Persist or discard the disk's mutations
    fn commit(
        &self,
        expose_id: &str,
        key: &CacheKey,
        should_commit: bool,
        vm_hydrated_git_mirror: bool,
    ) -> GitCacheResult<()>;
}

/// HTTP client for the sticky disk broker
pub struct BrokerClient {
    base_url: String,
    identity: BrokerIdentity,
    agent: ureq::Agent,
}

impl BrokerClient {
    /// Create a client for the broker at `{agent_addr}:{port}`
    pub fn new(
        agent_addr: &str,
        port: u16,
        identity: BrokerIdentity,
        request_timeout: Duration,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build();

        Self {
            base_url: format!("http://{}:{}", agent_addr, port),
            identity,
            agent: config.new_agent(),
        }
    }

    fn post_json<T: Serialize>(&self, url: &str, request: &T) -> GitCacheResult<(u16, String)> {
        let mut response = self
            .agent
            .post(url)
            .header("Authorization", &format!("Bearer {}", self.identity.token))
            .send_json(request)
            .map_err(|e| GitCacheError::Connection {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| GitCacheError::Connection {
                url: url.to_string(),
                reason: format!("reading response body: {}", e),
            })?;

        Ok((status, body))
    }
}

impl Broker for BrokerClient {
    /// Returns `Acquisition::InProgress` when the broker reports another
    /// execution holds the hydration lock for this key; any other
    /// non-success status is a hard error.
    fn acquire(&self, key: &CacheKey) -> GitCacheResult<Acquisition> {
        let url = format!("{}/stickydisks", self.base_url);
        let sticky_disk_key = key.sticky_disk_key();
        let request = AcquireRequest {
            sticky_disk_key: &sticky_disk_key,
            sticky_disk_type: STICKY_DISK_TYPE,
            region: &self.identity.region,
            installation_model_id: &self.identity.installation_id,
            vm_id: &self.identity.vm_id,
            repo_name: &sticky_disk_key,
        };

        debug!("Acquiring sticky disk for {}", sticky_disk_key);
        let (status, body) = self.post_json(&url, &request)?;
        decode_acquire(status, &body)
    }

    /// Called exactly once per acquired grant, even on degraded paths
    /// (with `should_commit = false`): skipping the call would leave the
    /// broker's hydration lock held indefinitely.
    fn commit(
        &self,
        expose_id: &str,
        key: &CacheKey,
        should_commit: bool,
        vm_hydrated_git_mirror: bool,
    ) -> GitCacheResult<()> {
        let url = format!("{}/stickydisks/commit", self.base_url);
        let sticky_disk_key = key.sticky_disk_key();
        let request = CommitRequest {
            expose_id,
            sticky_disk_key: &sticky_disk_key,
            vm_id: &self.identity.vm_id,
            should_commit,
            repo_name: &sticky_disk_key,
            vm_hydrated_git_mirror,
        };

        debug!(
            "Committing sticky disk for {} (persist: {}, hydrated: {})",
            sticky_disk_key, should_commit, vm_hydrated_git_mirror
        );
        let (status, body) = self.post_json(&url, &request)?;
        decode_commit(status, &body)
    }
}

/// Decode an acquire response. Factored out of the transport so the
/// status mapping is testable without a live broker.
fn decode_acquire(status: u16, body: &str) -> GitCacheResult<Acquisition> {
    if (200..300).contains(&status) {
        let response: AcquireResponse = serde_json::from_str(body)
            .map_err(|e| GitCacheError::Device(format!("undecodable acquire response: {}", e)))?;

        let expose_id = response
            .expose_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GitCacheError::Device("missing exposeId in response".to_string()))?;
        let device = response
            .device_name
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GitCacheError::Device("missing deviceName in response".to_string()))?;

        return Ok(Acquisition::Acquired(DiskGrant { expose_id, device }));
    }

    let error: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    if error.code.as_deref() == Some(CODE_HYDRATION_IN_PROGRESS) {
        let reason = error
            .message
            .unwrap_or_else(|| "another execution is hydrating this repository".to_string());
        return Ok(Acquisition::InProgress(reason));
    }

    Err(GitCacheError::Broker {
        status,
        message: error.message.unwrap_or_else(|| body.to_string()),
    })
}

fn decode_commit(status: u16, body: &str) -> GitCacheResult<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let error: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    Err(GitCacheError::Broker {
        status,
        message: error.message.unwrap_or_else(|| body.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_acquire_success() {
        let body = r#"{"exposeId": "exp-123", "deviceName": "/dev/vdb"}"#;
        match decode_acquire(200, body).unwrap() {
            Acquisition::Acquired(grant) => {
                assert_eq!(grant.expose_id, "exp-123");
                assert_eq!(grant.device, "/dev/vdb");
            }
            other => panic!("expected Acquired, got {:?}", other),
        }
    }

    #[test]
    fn decode_acquire_missing_expose_id() {
        let body = r#"{"deviceName": "/dev/vdb"}"#;
        let err = decode_acquire(200, body).unwrap_err();
        assert!(matches!(err, GitCacheError::Device(_)));
        assert!(err.to_string().contains("exposeId"));
    }

    #[test]
    fn decode_acquire_missing_device() {
        let body = r#"{"exposeId": "exp-123"}"#;
        let err = decode_acquire(200, body).unwrap_err();
        assert!(matches!(err, GitCacheError::Device(_)));
        assert!(err.to_string().contains("deviceName"));
    }

    #[test]
    fn decode_acquire_hydration_in_progress() {
        let body = r#"{"code": "hydration_in_progress", "message": "runner-7 is cloning"}"#;
        match decode_acquire(409, body).unwrap() {
            Acquisition::InProgress(reason) => assert!(reason.contains("runner-7")),
            other => panic!("expected InProgress, got {:?}", other),
        }
    }

    #[test]
    fn decode_acquire_other_conflict_is_error() {
        let body = r#"{"code": "disk_busy", "message": "disk is checked out"}"#;
        let err = decode_acquire(409, body).unwrap_err();
        assert!(matches!(err, GitCacheError::Broker { status: 409, .. }));
    }

    #[test]
    fn decode_acquire_server_error() {
        let err = decode_acquire(500, "internal error").unwrap_err();
        assert!(matches!(err, GitCacheError::Broker { status: 500, .. }));
    }

    #[test]
    fn decode_commit_success() {
        decode_commit(200, "{}").unwrap();
        decode_commit(204, "").unwrap();
    }

    #[test]
    fn decode_commit_failure() {
        let err = decode_commit(500, r#"{"message": "commit failed"}"#).unwrap_err();
        assert!(matches!(err, GitCacheError::Broker { status: 500, .. }));
        assert!(err.to_string().contains("commit failed"));
    }
}
