//! Backoff settings and bounded retry of transient vendor faults

use crate::context::OperationContext;
use crate::error::{CloudError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Implemented by vendor client errors so the retry loop can tell
/// recoverable faults (network, throttling, expired credentials) apart
/// from rejections that must surface immediately.
pub trait Transience {
    fn is_transient(&self) -> bool;
}

/// Retry configuration for individual vendor calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Scale each delay by a random factor in 0.5..1.5
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            attempt,
        )
    }
}

/// Status polling configuration
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay after the first non-terminal observation
    pub initial_interval: Duration,

    /// Upper bound for the delay between two observations
    pub max_interval: Duration,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Overall deadline for reaching a terminal state
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            timeout: Duration::from_secs(20 * 60),
        }
    }
}

impl PollConfig {
    /// Delay after non-terminal observation number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(
            self.initial_interval,
            self.max_interval,
            self.multiplier,
            attempt,
        )
    }
}

fn backoff(initial: Duration, max: Duration, multiplier: f64, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay = initial.as_secs_f64() * multiplier.powi(exponent);
    if !delay.is_finite() {
        return max;
    }
    Duration::from_secs_f64(delay.min(max.as_secs_f64()))
}

/// Run a vendor call, retrying transient faults with exponential backoff.
///
/// The outer `Result` carries what the retry loop itself decided:
/// - [`CloudError::Transient`] once the attempt budget is spent
/// - [`CloudError::Cancelled`] when the token fires during a call or backoff
/// - [`CloudError::Timeout`] when the context deadline passes
/// The inner `Result` is the call's own outcome, with non-transient vendor
/// errors returned untouched so the caller can interpret codes such as
/// "not found" or "already exists".
pub async fn retry_transient<F, Fut, T, E>(
    config: &RetryConfig,
    resource: &str,
    operation: &str,
    ctx: &OperationContext,
    mut call: F,
) -> Result<std::result::Result<T, E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Transience + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        if ctx.is_cancelled() {
            return Err(CloudError::cancelled(resource));
        }
        attempt += 1;

        let err = match ctx.guard(resource, call()).await? {
            Ok(value) => return Ok(Ok(value)),
            Err(e) if !e.is_transient() => return Ok(Err(e)),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            tracing::error!(
                resource = %resource,
                operation = %operation,
                attempt,
                error = %err,
                "transient failure, retry budget exhausted"
            );
            return Err(CloudError::Transient {
                attempts: attempt,
                message: format!("{operation}: {err}"),
            });
        }

        let mut delay = config.delay_for_attempt(attempt - 1);
        if config.jitter {
            let factor = rand::thread_rng().gen_range(0.5..1.5);
            delay = Duration::from_secs_f64(delay.as_secs_f64() * factor);
        }

        tracing::warn!(
            resource = %resource,
            operation = %operation,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "transient failure, retrying"
        );

        ctx.guard(resource, tokio::time::sleep(delay)).await?;
    }
}
