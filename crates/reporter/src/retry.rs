//! Retry executor for fallible async operations

use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace};

use crate::backoff::{geometric_backoff, linear_backoff, BackoffFn, BackoffStrategy};

/// Total attempts made before a failure is handed back to the caller
pub const MAX_ATTEMPTS: u32 = 5;

/// Runs an operation until it succeeds or the attempt budget is spent
#[derive(Debug, Clone)]
pub struct RetryExecutor<P = BackoffFn> {
    policy: P,
    max_attempts: u32,
}

impl RetryExecutor<BackoffFn> {
    pub fn linear() -> Self {
        Self::new(linear_backoff)
    }

    pub fn geometric() -> Self {
        Self::new(geometric_backoff)
    }

    pub fn from_strategy(strategy: BackoffStrategy) -> Self {
        Self::new(strategy.policy())
    }
}

impl Default for RetryExecutor<BackoffFn> {
    fn default() -> Self {
        Self::linear()
    }
}

impl<P> RetryExecutor<P>
where
    P: Fn(u32) -> Duration,
{
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Override the attempt budget; at least one attempt is always made
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Execute an operation with retry logic
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_observed(operation, |_, _| {}).await
    }

    /// Execute an operation, reporting every failed attempt to `on_failure`.
    ///
    /// `on_failure` sees each error together with its 1-based attempt number,
    /// the final one included. The error of the last attempt is returned as is.
    pub async fn execute_observed<T, E, F, Fut, O>(
        &self,
        mut operation: F,
        mut on_failure: O,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        O: FnMut(&E, u32),
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    on_failure(&err, attempt);

                    if attempt >= self.max_attempts {
                        return Err(err);
                    }

                    let delay = (self.policy)(attempt);
                    trace!(attempt, ?delay, "waiting before next attempt");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Retry `operation` up to [`MAX_ATTEMPTS`] times, sleeping `policy(attempt)`
/// between attempts
pub async fn retry<T, E, F, Fut, P, O>(operation: F, policy: P, on_failure: O) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(u32) -> Duration,
    O: FnMut(&E, u32),
{
    RetryExecutor::new(policy)
        .execute_observed(operation, on_failure)
        .await
}
