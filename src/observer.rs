//! Job-outcome observer
//!
//! The commit decision needs to know whether the user's job steps failed
//! or were cancelled. That signal lives outside this process; the agent
//! exposes it over HTTP. Ambiguity is treated as failure: if the observer
//! cannot answer, the mirror state is not persisted.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of the user's job steps, as reported by the agent
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    /// Whether any step failed or was cancelled
    pub has_failures: bool,
    /// Number of failed steps
    pub failed_count: u32,
    /// Names of failed steps, for diagnostics
    pub failed_steps: Vec<String>,
    /// Set when the observer itself could not answer
    pub error: Option<String>,
}

impl JobOutcome {
    /// Whether this outcome forces the commit gate closed.
    ///
    /// An unavailable observer gates exactly like a failed job.
    pub fn gates_commit(&self) -> bool {
        self.has_failures || self.error.is_some()
    }

    /// An outcome representing an unreachable or undecodable observer
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Source of job-outcome signals, consulted once during cleanup
#[async_trait]
pub trait JobOutcomeObserver: Send + Sync {
    /// Query whether any job steps failed
    async fn check_failures(&self) -> JobOutcome;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailuresResponse {
    has_failures: bool,
    #[serde(default)]
    failed_count: u32,
    #[serde(default)]
    failed_steps: Vec<String>,
}

/// Observer backed by the agent's failures endpoint
pub struct AgentObserver {
    url: String,
    token: String,
    request_timeout: Duration,
}

impl AgentObserver {
    /// Create an observer for the agent at `{agent_addr}:{port}`
    pub fn new(agent_addr: &str, port: u16, vm_id: &str, token: &str, request_timeout: Duration) -> Self {
        Self {
            url: format!("http://{}:{}/jobs/{}/failures", agent_addr, port, vm_id),
            token: token.to_string(),
            request_timeout,
        }
    }

    fn fetch(url: String, token: String, request_timeout: Duration) -> JobOutcome {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(request_timeout))
            .build();
        let agent = config.new_agent();

        let response = agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", token))
            .call();

        match response {
            Ok(mut response) => match response.body_mut().read_json::<FailuresResponse>() {
                Ok(parsed) => JobOutcome {
                    has_failures: parsed.has_failures,
                    failed_count: parsed.failed_count,
                    failed_steps: parsed.failed_steps,
                    error: None,
                },
                Err(e) => JobOutcome::unavailable(format!("undecodable failures response: {}", e)),
            },
            Err(e) => JobOutcome::unavailable(format!("failures endpoint unreachable: {}", e)),
        }
    }
}

#[async_trait]
impl JobOutcomeObserver for AgentObserver {
    async fn check_failures(&self) -> JobOutcome {
        let url = self.url.clone();
        let token = self.token.clone();
        let request_timeout = self.request_timeout;

        let outcome = tokio::task::spawn_blocking(move || Self::fetch(url, token, request_timeout))
            .await
            .unwrap_or_else(|e| JobOutcome::unavailable(format!("observer task failed: {}", e)));

        if outcome.has_failures {
            warn!(
                "Job reported {} failed step(s): {:?}",
                outcome.failed_count, outcome.failed_steps
            );
        } else if let Some(ref reason) = outcome.error {
            warn!("Job outcome unavailable (treating as failed): {}", reason);
        } else {
            debug!("Job reported no failed steps");
        }

        outcome
    }
}

/// Fixed-outcome observer for tests
pub struct StaticObserver {
    outcome: JobOutcome,
}

impl StaticObserver {
    /// An observer that always reports the given outcome
    pub fn new(outcome: JobOutcome) -> Self {
        Self { outcome }
    }

    /// An observer reporting a clean job
    pub fn passing() -> Self {
        Self::new(JobOutcome::default())
    }

    /// An observer reporting failed steps
    pub fn failing(steps: &[&str]) -> Self {
        Self::new(JobOutcome {
            has_failures: true,
            failed_count: steps.len() as u32,
            failed_steps: steps.iter().map(|s| s.to_string()).collect(),
            error: None,
        })
    }
}

#[async_trait]
impl JobOutcomeObserver for StaticObserver {
    async fn check_failures(&self) -> JobOutcome {
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_outcome_allows_commit() {
        assert!(!JobOutcome::default().gates_commit());
    }

    #[test]
    fn failures_gate_commit() {
        let outcome = JobOutcome {
            has_failures: true,
            failed_count: 2,
            failed_steps: vec!["build".to_string(), "test".to_string()],
            error: None,
        };
        assert!(outcome.gates_commit());
    }

    #[test]
    fn unavailable_observer_gates_commit() {
        assert!(JobOutcome::unavailable("connection refused").gates_commit());
    }

    #[tokio::test]
    async fn static_observer_reports_fixed_outcome() {
        let outcome = StaticObserver::failing(&["test"]).check_failures().await;
        assert!(outcome.has_failures);
        assert_eq!(outcome.failed_count, 1);

        let outcome = StaticObserver::passing().check_failures().await;
        assert!(!outcome.gates_commit());
    }
}
