//! Bounded retry and wall-clock timeout policies
//!
//! Network-facing git operations (clone, fetch) run under `RetryPolicy`.
//! Maintenance operations (refresh, gc, fsck) additionally run under a
//! hard deadline via [`timeboxed`], which reports expiry as `timed_out`
//! rather than a generic failure so callers can tell "slow" from "broken".

use crate::config::schema::RetryConfig;
use crate::error::{GitCacheError, GitCacheResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Uniform outcome of a timeboxed maintenance operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    /// Whether the operation completed successfully
    pub success: bool,
    /// Whether the operation was terminated at its deadline
    pub timed_out: bool,
    /// Failure detail, if any
    pub error: Option<String>,
}

impl OperationResult {
    /// A successful outcome
    pub fn ok() -> Self {
        Self {
            success: true,
            timed_out: false,
            error: None,
        }
    }

    /// A failed (but not timed-out) outcome
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            timed_out: false,
            error: Some(error.into()),
        }
    }

    /// A deadline-expired outcome
    pub fn timed_out(op: &str, secs: u64) -> Self {
        Self {
            success: false,
            timed_out: true,
            error: Some(format!("{} exceeded {}s deadline", op, secs)),
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
        }
    }

    /// Create a policy with explicit bounds (used by tests)
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Run `op` until it succeeds, fails non-retryably, or attempts are
    /// exhausted. Backoff doubles per attempt.
    pub async fn run<T, F, Fut>(&self, op_name: &str, op: F) -> GitCacheResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GitCacheResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = self.initial_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        op_name, attempt, self.max_attempts, delay, e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Run `fut` under a hard wall-clock deadline.
///
/// Spawned child processes must use `kill_on_drop` so that an expired
/// deadline terminates the underlying process outright rather than
/// leaving it running behind the job.
pub async fn timeboxed<Fut>(op_name: &str, deadline: Duration, fut: Fut) -> OperationResult
where
    Fut: Future<Output = GitCacheResult<()>>,
{
    match timeout(deadline, fut).await {
        Ok(Ok(())) => {
            debug!("{} completed within {:?}", op_name, deadline);
            OperationResult::ok()
        }
        Ok(Err(e)) => {
            warn!("{} failed: {}", op_name, e);
            OperationResult::failed(e.to_string())
        }
        Err(_) => {
            warn!("{} exceeded {:?} deadline, terminated", op_name, deadline);
            OperationResult::timed_out(op_name, deadline.as_secs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn retry_succeeds_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = quick_policy(3)
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GitCacheError>(42)
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = quick_policy(3)
            .run("op", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(GitCacheError::mirror("fetch", "early EOF"))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let err = quick_policy(3)
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GitCacheError::mirror("clone", "exit 128"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GitCacheError::Mirror { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let err = quick_policy(5)
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GitCacheError::Device("missing exposeId".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GitCacheError::Device(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeboxed_success() {
        let result = timeboxed("op", Duration::from_secs(5), async { Ok(()) }).await;
        assert!(result.success);
        assert!(!result.timed_out);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn timeboxed_failure_is_not_timeout() {
        let result = timeboxed("op", Duration::from_secs(5), async {
            Err(GitCacheError::mirror("gc", "exit 1"))
        })
        .await;

        assert!(!result.success);
        assert!(!result.timed_out);
        assert!(result.error.unwrap().contains("gc"));
    }

    #[tokio::test]
    async fn timeboxed_deadline_expiry() {
        let result = timeboxed("fsck", Duration::from_millis(10), async {
            sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.error.unwrap().contains("deadline"));
    }
}
