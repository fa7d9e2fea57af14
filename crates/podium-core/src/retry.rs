//! Bounded retry with exponential backoff over lagging reads.
//!
//! The store may not show a row straight after it was written. Reads that
//! need to observe such a row go through [`retry`], which re-invokes the read
//! until enough results are present or the attempt budget is spent.

use std::future::Future;
use std::time::Duration;

use podium_state::StorageResult;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::obs::ScoringObserver;

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total invocations, including the first (0 is treated as 1).
    pub max_attempts: u32,
    /// Delay before the first retry (milliseconds).
    pub initial_delay_ms: u64,
    /// Factor applied to the delay for each further retry.
    pub backoff_multiplier: f64,
    /// Presence count at which a result is accepted.
    pub min_acceptable_count: usize,
}

impl RetryPolicy {
    /// Policy for plain reads.
    pub fn read_default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 100,
            backoff_multiplier: 2.0,
            min_acceptable_count: 1,
        }
    }

    /// Policy for re-reads that must observe a row another writer created.
    pub fn write_default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay_ms: 50,
            backoff_multiplier: 2.0,
            min_acceptable_count: 1,
        }
    }

    pub fn with_min_acceptable(mut self, count: usize) -> Self {
        self.min_acceptable_count = count;
        self
    }

    /// Delay before the `retry`-th retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exp);
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::read_default()
    }
}

/// What happens when the budget runs out without an acceptable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Return the last result, flagged unsatisfied.
    Soft,
    /// Fail with `ScoringError::NotFound`.
    Hard,
}

/// How many results a read produced.
pub trait Presence {
    fn presence(&self) -> usize;
}

impl<T> Presence for Vec<T> {
    fn presence(&self) -> usize {
        self.len()
    }
}

impl<T> Presence for Option<T> {
    fn presence(&self) -> usize {
        usize::from(self.is_some())
    }
}

/// Result of a retried read.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Invocations made (1 = no retries used).
    pub attempts: u32,
    /// False only on soft exhaustion: the read never settled.
    pub satisfied: bool,
}

/// Invoke `op` until its result reaches `policy.min_acceptable_count`.
///
/// Errors returned by `op` are propagated immediately without retrying.
pub async fn retry<T, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    mode: Exhaustion,
    observer: &dyn ScoringObserver,
    mut op: F,
) -> Result<RetryOutcome<T>>
where
    T: Presence,
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let value = op().await?;
        if value.presence() >= policy.min_acceptable_count {
            return Ok(RetryOutcome {
                value,
                attempts: attempt,
                satisfied: true,
            });
        }

        if attempt >= max_attempts {
            observer.retry_exhausted(what, attempt, mode == Exhaustion::Hard);
            return match mode {
                Exhaustion::Soft => Ok(RetryOutcome {
                    value,
                    attempts: attempt,
                    satisfied: false,
                }),
                Exhaustion::Hard => Err(ScoringError::not_found(what, attempt)),
            };
        }

        let delay = policy.delay_for(attempt);
        observer.retry_attempt(what, attempt, delay.as_millis() as u64);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
