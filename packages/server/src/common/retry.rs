//! Timeout and bounded-retry policy for store calls.
//!
//! Every store call goes through [`StorePolicy::run`] so a stalled database
//! surfaces as a retryable error instead of hanging the request. Read-only
//! calls may additionally use [`StorePolicy::run_read`], which retries
//! transient failures a bounded number of times.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors that can tell transient failures apart from terminal ones.
pub trait Transient {
    /// Whether retrying the same call may succeed.
    fn should_retry(&self) -> bool;

    /// Error to surface when the call did not finish within the timeout.
    fn timed_out(operation: &'static str, after: Duration) -> Self;
}

#[derive(Debug, Clone, Copy)]
pub struct StorePolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl StorePolicy {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(50),
        }
    }

    /// Run a single attempt bounded by the policy timeout.
    pub async fn run<T, E, Fut>(&self, operation: &'static str, fut: Fut) -> Result<T, E>
    where
        E: Transient,
        Fut: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(operation, self.timeout)),
        }
    }

    /// Run an idempotent call, retrying transient failures with linear backoff.
    pub async fn run_read<T, E, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match self.run(operation, call()).await {
                Err(e) if e.should_retry() && attempt < self.max_attempts => {
                    warn!(operation, attempt, error = %e, "Transient store failure, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 3)
    }
}
