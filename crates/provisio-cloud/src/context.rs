//! Per-call deadline and cancellation

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Passed to every blocking provider operation
///
/// Cancelling the token stops the wait promptly; it never undoes a vendor
/// operation that was already submitted.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an externally owned token (e.g. shared with a controller shutdown)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the provider's default overall timeout for this call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The call's timeout, or `default` when none was set
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }

    /// Fix the overall deadline of one operation.
    ///
    /// The returned context shares the cancellation token. Starting a
    /// context that already has a deadline keeps that deadline, so every
    /// phase of a multi-step operation draws from the same budget.
    pub fn start(&self, default_timeout: Duration) -> Self {
        if self.deadline.is_some() {
            return self.clone();
        }
        let timeout = self.timeout_or(default_timeout);
        Self {
            cancel: self.cancel.clone(),
            timeout: Some(timeout),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` until it completes, the token is cancelled or the
    /// deadline passes, whichever comes first.
    ///
    /// Dropping `fut` on cancellation only abandons the wait; a request
    /// the vendor already accepted keeps running.
    pub async fn guard<F: Future>(&self, resource: &str, fut: F) -> Result<F::Output> {
        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CloudError::cancelled(resource)),
            _ = expiry => Err(CloudError::Timeout {
                resource: resource.to_string(),
                after: self.timeout.unwrap_or_default(),
            }),
            output = fut => Ok(output),
        }
    }
}
