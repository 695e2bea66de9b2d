//! 재시도 정책
//!
//! One composable retry policy: attempt budget, fixed delay with optional
//! jitter, and a pluggable predicate deciding which errors are retried.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::domain::errors::ItemError;
use crate::infrastructure::config::RecoveryConfig;

/// 재시도 정책 설정
#[derive(Debug, Clone)]
pub struct RetryPolicy<E = ItemError> {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// 재시도 사이 고정 지연
    pub delay: Duration,
    /// Upper bound of the random extra delay; zero disables jitter
    pub jitter: Duration,
    /// 재시도 대상 오류 판별
    pub predicate: fn(&E) -> bool,
}

impl RetryPolicy<ItemError> {
    /// Per-item policy: transient and unclassified failures are retried.
    pub fn for_items(config: &RecoveryConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            delay: config.retry_delay(),
            jitter: config.retry_jitter(),
            predicate: ItemError::is_retryable,
        }
    }
}

impl<E: std::fmt::Display> RetryPolicy<E> {
    pub const fn new(max_retries: u32, delay: Duration, predicate: fn(&E) -> bool) -> Self {
        Self {
            max_retries,
            delay,
            jitter: Duration::ZERO,
            predicate,
        }
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// 재시도 가능 여부 확인
    pub fn should_retry(&self, error: &E, retries_done: u32) -> bool {
        retries_done < self.max_retries && (self.predicate)(error)
    }

    /// 지연 시간 계산
    pub fn calculate_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        self.delay + Duration::from_millis(fastrand::u64(0..=jitter_ms))
    }

    /// Runs `op` against `state`, retrying per this policy.
    ///
    /// The last error is returned unchanged once the budget is spent or the
    /// predicate rejects it.
    pub async fn run<S, T, F>(&self, state: &mut S, mut op: F) -> Result<T, E>
    where
        S: ?Sized + Send,
        F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T, E>>,
    {
        let mut retries_done = 0;
        loop {
            match op(state).await {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(&error, retries_done) => {
                    retries_done += 1;
                    let delay = self.calculate_delay();
                    warn!(
                        "🔄 Attempt failed ({}), retry {}/{} in {:?}",
                        error, retries_done, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    debug!("Giving up after {} retries: {}", retries_done, error);
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn flaky(calls: &mut u32, fail_times: u32, make: fn() -> ItemError) -> BoxFuture<'_, Result<u32, ItemError>> {
        async move {
            *calls += 1;
            if *calls <= fail_times { Err(make()) } else { Ok(*calls) }
        }
        .boxed()
    }

    fn transient() -> ItemError {
        ItemError::from_message("connection reset")
    }

    fn session_gone() -> ItemError {
        ItemError::from_message("invalid session id")
    }

    #[tokio::test]
    async fn retries_transient_errors_within_budget() {
        let policy = RetryPolicy::new(1, Duration::from_millis(10), ItemError::is_retryable);
        let mut calls = 0;
        let result = policy.run(&mut calls, |c| flaky(c, 1, transient)).await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn gives_up_when_budget_is_spent() {
        let policy = RetryPolicy::new(1, Duration::from_millis(1), ItemError::is_retryable);
        let mut calls = 0;
        let result = policy.run(&mut calls, |c| flaky(c, 5, transient)).await;
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn predicate_rejects_session_loss() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), ItemError::is_retryable);
        let mut calls = 0;
        let result = policy.run(&mut calls, |c| flaky(c, 5, session_gone)).await;
        assert!(result.unwrap_err().is_session_invalid());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn waits_the_configured_delay() {
        let policy = RetryPolicy::new(1, Duration::from_millis(80), ItemError::is_retryable);
        let mut calls = 0;
        let started = tokio::time::Instant::now();
        policy.run(&mut calls, |c| flaky(c, 1, transient)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(1, Duration::from_millis(100), ItemError::is_retryable)
            .with_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            let d = policy.calculate_delay();
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(150));
        }
    }
}
