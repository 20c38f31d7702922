use super::tool::StreamTool;
use std::future::Future;
use std::time::Duration;
use streamsnap_core::{Error, Result};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(300);

/// Fixed-interval polling bounded by an overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Wait between a failed probe and the next one
    pub interval: Duration,
    /// Total time allowed before giving up
    pub deadline: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_READY_TIMEOUT,
        }
    }
}

impl ReadinessPolicy {
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline,
            ..Default::default()
        }
    }

    /// Probes immediately, then after every interval until a probe succeeds
    /// or the deadline passes. Probe errors are never surfaced; only the
    /// timeout is. Returns the number of probes made.
    pub async fn poll<F, Fut>(&self, operation_name: &str, mut probe: F) -> Result<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match probe().await {
                Ok(()) => {
                    if attempts > 1 {
                        debug!(
                            operation = operation_name,
                            attempts,
                            "Probe succeeded after retry"
                        );
                    }
                    return Ok(attempts);
                }
                Err(error) => {
                    let elapsed = started.elapsed();
                    if elapsed >= self.deadline {
                        warn!(
                            operation = operation_name,
                            attempts,
                            error = %error,
                            "Giving up after deadline"
                        );
                        return Err(Error::ReadinessTimeout {
                            waited_secs: self.deadline.as_secs(),
                        });
                    }
                    let wait = self.interval.min(self.deadline - elapsed);
                    debug!(
                        operation = operation_name,
                        attempt = attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %error,
                        "Probe failed, waiting"
                    );
                    sleep(wait).await;
                }
            }
        }
    }
}

/// Blocks until the server accepts connections through `tool`.
pub async fn wait_for_ready(
    tool: &dyn StreamTool,
    policy: &ReadinessPolicy,
    warning_threshold: &str,
) -> Result<()> {
    info!("Waiting for the NATS server to be ready");
    let attempts = policy
        .poll("check connection", move || tool.check_connection(warning_threshold))
        .await?;
    info!(attempts, "NATS server is ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::test_support::FakeTool;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_poll_succeeds_eventually() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let started = Instant::now();

        let result = ReadinessPolicy::default()
            .poll("test_probe", || {
                let attempts = attempts_clone.clone();
                async move {
                    let count = attempts.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(Error::Other("connection refused".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_is_immediate() {
        let started = Instant::now();
        let result = ReadinessPolicy::default().poll("test_probe", || async { Ok(()) }).await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_at_deadline() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let started = Instant::now();

        let result = ReadinessPolicy::default()
            .poll("test_probe", || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Other("connection refused".to_string()))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() >= DEFAULT_READY_TIMEOUT);
        // probes at 0s, 5s, ..., 300s
        assert_eq!(attempts.load(Ordering::SeqCst), 61);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_wait_is_clamped_to_deadline() {
        let policy = ReadinessPolicy {
            interval: Duration::from_secs(5),
            deadline: Duration::from_secs(7),
        };
        let started = Instant::now();

        let result = policy
            .poll("test_probe", || async { Err(Error::Other("down".to_string())) })
            .await;

        assert!(matches!(result, Err(Error::ReadinessTimeout { waited_secs: 7 })));
        assert!(started.elapsed() >= Duration::from_secs(7));
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_passes_warning_threshold() {
        let tool = FakeTool::new(&[]);
        tool.fail_probes(1);

        wait_for_ready(&tool, &ReadinessPolicy::default(), "30s").await.unwrap();

        assert_eq!(tool.calls(), ["probe 30s", "probe 30s"]);
    }
}
