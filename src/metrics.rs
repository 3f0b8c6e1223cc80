//! Fire-and-forget metric reporting
//!
//! Cache hit rates and hydration timings go to the agent as a side
//! channel. Reporting failure is logged and dropped; it must never
//! affect the cache lifecycle.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Sink for lifecycle events
#[async_trait]
pub trait MetricReporter: Send + Sync {
    /// Report one event. Implementations swallow their own failures.
    async fn report(&self, event: &str, data: serde_json::Value);
}

/// Reporter that posts events to the agent
pub struct AgentReporter {
    url: String,
    token: String,
    vm_id: String,
    request_timeout: Duration,
}

impl AgentReporter {
    /// Create a reporter for the agent at `{agent_addr}:{port}`
    pub fn new(agent_addr: &str, port: u16, vm_id: &str, token: &str, request_timeout: Duration) -> Self {
        Self {
            url: format!("http://{}:{}/metrics", agent_addr, port),
            token: token.to_string(),
            vm_id: vm_id.to_string(),
            request_timeout,
        }
    }
}

#[async_trait]
impl MetricReporter for AgentReporter {
    async fn report(&self, event: &str, data: serde_json::Value) {
        let url = self.url.clone();
        let token = self.token.clone();
        let body = serde_json::json!({
            "event": event,
            "vmId": self.vm_id,
            "data": data,
        });
        let request_timeout = self.request_timeout;

        let result = tokio::task::spawn_blocking(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(request_timeout))
                .build();
            config
                .new_agent()
                .post(&url)
                .header("Authorization", &format!("Bearer {}", token))
                .send_json(&body)
                .map(|_| ())
        })
        .await;

        match result {
            Ok(Ok(())) => debug!("Reported metric event {}", event),
            Ok(Err(e)) => warn!("Dropping metric event {}: {}", event, e),
            Err(e) => warn!("Dropping metric event {}: {}", event, e),
        }
    }
}

/// Reporter that discards everything (tests, bypassed environments)
pub struct NoopReporter;

#[async_trait]
impl MetricReporter for NoopReporter {
    async fn report(&self, _event: &str, _data: serde_json::Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_reporter_accepts_events() {
        NoopReporter
            .report("cache_hit", serde_json::json!({"repo": "acme/widgets"}))
            .await;
    }
}
