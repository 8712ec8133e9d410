//! Retry policy for transient database faults
//!
//! Backoff doubles from `base_delay` per attempt and is capped at `max_delay`.
//! Only errors for which `DbError::is_transient` holds are retried.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::DbError;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1).min(max_delay),
            max_delay,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay before retry number `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decide what to do after attempt number `attempt` (1-indexed) failed
    /// with `err`: `Some(delay)` to retry, `None` to give up.
    pub fn next_delay(&self, attempt: u32, err: &DbError) -> Option<Duration> {
        if err.is_transient() && attempt <= self.max_retries {
            Some(self.delay_for_retry(attempt))
        } else {
            None
        }
    }

    /// Wrap the final error once retries are used up.
    pub(crate) fn give_up(&self, attempt: u32, err: DbError) -> DbError {
        if err.is_transient() && attempt > 1 {
            DbError::RetriesExhausted {
                attempts: attempt,
                source: Box::new(err),
            }
        } else {
            err
        }
    }

    /// Handle the failure of attempt number `attempt` (1-indexed): log and
    /// sleep, returning `Ok(())` when the caller should try again, or the
    /// final error.
    pub async fn backoff(&self, what: &str, attempt: u32, err: DbError) -> Result<(), DbError> {
        match self.next_delay(attempt, &err) {
            Some(delay) => {
                warn!(
                    "{} failed with transient error (attempt {}/{}), retrying in {:?}: {}",
                    what,
                    attempt,
                    self.max_retries + 1,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Err(self.give_up(attempt, err)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(30))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy gives up.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => policy.backoff(what, attempt, err).await?,
        }
    }
}
