//! Poll a vendor resource until it reaches a terminal state

use crate::context::OperationContext;
use crate::error::Result;
use crate::retry::PollConfig;
use std::future::Future;

/// Result of one status observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Terminal success; stop polling
    Done(T),
    /// Not terminal yet; the string is the vendor status for logging
    Pending(String),
}

/// Repeatedly run `check` with exponential backoff between observations.
///
/// Stops when `check` returns [`PollStep::Done`] or an error. Terminal
/// failure states are reported by `check` as errors. The deadline is the
/// one already fixed on `ctx` by [`OperationContext::start`]; otherwise it
/// is derived from the context timeout, falling back to `config.timeout`.
/// Cancellation is observed at any point of the wait and returns
/// [`CloudError::Cancelled`](crate::error::CloudError::Cancelled) without
/// touching the vendor resource.
pub async fn poll_until<F, Fut, T>(
    config: &PollConfig,
    resource: &str,
    ctx: &OperationContext,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep<T>>>,
{
    let ctx = ctx.start(config.timeout);
    let started = tokio::time::Instant::now();

    let observe = async {
        let mut attempt = 0u32;
        loop {
            match check().await? {
                PollStep::Done(value) => {
                    tracing::debug!(
                        resource = %resource,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "reached terminal state"
                    );
                    return Ok(value);
                }
                PollStep::Pending(status) => {
                    let delay = config.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::debug!(
                        resource = %resource,
                        status = %status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "waiting for terminal state"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    };

    match ctx.guard(resource, observe).await {
        Ok(result) => result,
        Err(err) => {
            if err.is_cancelled() {
                tracing::info!(resource = %resource, "wait cancelled; vendor operation left in flight");
            } else {
                tracing::warn!(resource = %resource, error = %err, "timed out before terminal state");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn config() -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(4),
            multiplier: 2.0,
            timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_after_pending() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let value = poll_until(&config(), "cache/c1", &OperationContext::new(), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 3 {
                    Ok(PollStep::Pending("creating".to_string()))
                } else {
                    Ok(PollStep::Done("endpoint"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "endpoint");
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_propagates() {
        let err = poll_until(&config(), "db/x", &OperationContext::new(), || async {
            Err::<PollStep<()>, _>(CloudError::provisioning("db/x", "incompatible-parameters"))
        })
        .await
        .unwrap_err();

        assert_eq!(err.vendor_reason(), Some("incompatible-parameters"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let ctx = OperationContext::new().with_timeout(Duration::from_secs(10));
        let err = poll_until(&config(), "cache/c1", &ctx, || async {
            Ok::<PollStep<()>, CloudError>(PollStep::Pending("creating".to_string()))
        })
        .await
        .unwrap_err();

        match err {
            CloudError::Timeout { resource, after } => {
                assert_eq!(resource, "cache/c1");
                assert_eq!(after, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_within_one_interval() {
        let ctx = OperationContext::new();
        let token = ctx.cancellation().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            token.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = poll_until(&config(), "cache/c1", &ctx, || async {
            Ok::<PollStep<()>, CloudError>(PollStep::Pending("creating".to_string()))
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_millis(1500) + config().max_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_share_one_deadline() {
        let ctx = OperationContext::new()
            .with_timeout(Duration::from_secs(10))
            .start(config().timeout);
        let started = tokio::time::Instant::now();

        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        poll_until(&config(), "cache/c1", &ctx, || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 3 {
                    Ok(PollStep::Pending("deleting".to_string()))
                } else {
                    Ok(PollStep::Done(()))
                }
            }
        })
        .await
        .unwrap();
        // 1 + 2 + 4 seconds of the budget are gone
        assert_eq!(started.elapsed(), Duration::from_secs(7));

        let err = poll_until(&config(), "cache/c1", &ctx, || async {
            Ok::<PollStep<()>, CloudError>(PollStep::Pending("creating".to_string()))
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }
}
