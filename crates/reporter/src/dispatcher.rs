//! Bounded-concurrency task dispatcher
//!
//! Tasks are interleaved on the caller's task rather than spawned, so nothing
//! here needs to be `Send` and no locking is involved. At most `concurrency`
//! tasks are in flight; results come back in input order no matter which task
//! finishes first.

use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::backoff::BackoffFn;
use crate::retry::RetryExecutor;

/// In-flight ceiling used when none is configured
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runs independent tasks through a retry executor with a concurrency ceiling
#[derive(Debug, Clone)]
pub struct Dispatcher<P = BackoffFn> {
    concurrency: usize,
    retry: RetryExecutor<P>,
}

impl Default for Dispatcher<BackoffFn> {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl Dispatcher<BackoffFn> {
    /// Dispatcher retrying with the linear backoff policy
    pub fn new(concurrency: usize) -> Self {
        Self::with_retry(concurrency, RetryExecutor::linear())
    }
}

impl<P> Dispatcher<P>
where
    P: Fn(u32) -> Duration,
{
    /// A ceiling of zero is treated as one
    pub fn with_retry(concurrency: usize, retry: RetryExecutor<P>) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retry,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task, each wrapped in the retry executor.
    ///
    /// The first task to exhaust its retries fails the whole call and the
    /// remaining in-flight tasks are dropped. Callers wanting partial success
    /// must absorb failures inside their task closures.
    pub async fn run_all<I, F, Fut, T, E>(&self, tasks: I) -> Result<Vec<T>, E>
    where
        I: IntoIterator<Item = F>,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let retry = &self.retry;
        let launch = move |index: usize, task: F| async move {
            let outcome = retry
                .execute_observed(task, |err: &E, attempt| {
                    warn!(task = index, attempt, error = %err, "Task attempt failed");
                })
                .await;
            (index, outcome)
        };

        let mut pending = tasks.into_iter().enumerate();
        let mut results: Vec<Option<T>> = Vec::new();
        let mut active = FuturesUnordered::new();

        loop {
            while active.len() < self.concurrency {
                match pending.next() {
                    Some((index, task)) => {
                        results.push(None);
                        active.push(launch(index, task));
                    }
                    None => break,
                }
            }

            match active.next().await {
                Some((index, Ok(value))) => {
                    debug!(task = index, "Task completed");
                    results[index] = Some(value);
                }
                Some((index, Err(err))) => {
                    error!(
                        task = index,
                        attempts = retry.max_attempts(),
                        error = %err,
                        "Task failed after exhausting retries"
                    );
                    return Err(err);
                }
                None => break,
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

/// Run `tasks` with the default linear retry policy and the given ceiling
pub async fn run_all<I, F, Fut, T, E>(tasks: I, concurrency: usize) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    Dispatcher::new(concurrency).run_all(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::sleep;

    fn no_delay(_attempt: u32) -> Duration {
        Duration::ZERO
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let delays = [30u64, 0, 10];

        for concurrency in [1, 3] {
            let tasks = (0..delays.len()).map(|i| {
                move || async move {
                    sleep(Duration::from_millis(delays[i])).await;
                    Ok::<_, String>(format!("result-{}", i))
                }
            });

            let results = run_all(tasks, concurrency).await.unwrap();
            assert_eq!(results, vec!["result-0", "result-1", "result-2"]);
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let active = Cell::new(0usize);
        let peak = Cell::new(0usize);

        let tasks = (0..8).map(|i| {
            let active = &active;
            let peak = &peak;
            move || async move {
                active.set(active.get() + 1);
                peak.set(peak.get().max(active.get()));
                sleep(Duration::from_millis(5)).await;
                active.set(active.get() - 1);
                Ok::<_, String>(i)
            }
        });

        let dispatcher = Dispatcher::with_retry(3, RetryExecutor::new(no_delay));
        let results = dispatcher.run_all(tasks).await.unwrap();

        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert_eq!(peak.get(), 3);
    }

    #[tokio::test]
    async fn test_failure_fails_whole_run() {
        let attempts = Cell::new(0u32);

        let tasks = (0..3).map(|i| {
            let attempts = &attempts;
            move || async move {
                if i == 1 {
                    attempts.set(attempts.get() + 1);
                    Err(format!("task {} unreachable", i))
                } else {
                    Ok(i)
                }
            }
        });

        let dispatcher = Dispatcher::with_retry(2, RetryExecutor::new(no_delay).with_max_attempts(3));
        let result = dispatcher.run_all(tasks).await;

        assert_eq!(result, Err("task 1 unreachable".to_string()));
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test]
    async fn test_tasks_are_retried() {
        let calls = Cell::new(0u32);

        let tasks = std::iter::once(|| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok(n)
                }
            }
        });

        let dispatcher = Dispatcher::with_retry(1, RetryExecutor::new(no_delay));
        assert_eq!(dispatcher.run_all(tasks).await, Ok(vec![2]));
    }

    #[tokio::test]
    async fn test_empty_and_zero_ceiling() {
        let tasks: Vec<fn() -> std::future::Ready<Result<(), String>>> = Vec::new();
        assert_eq!(run_all(tasks, 4).await, Ok(vec![]));

        let dispatcher = Dispatcher::new(0);
        assert_eq!(dispatcher.concurrency(), 1);
        assert_eq!(Dispatcher::default().concurrency(), DEFAULT_CONCURRENCY);
    }
}
