//! Retry utilities for resilient operations
//!
//! This module provides a common retry mechanism with capped exponential backoff
//! and random jitter. It is shared by the trend fetcher and the recommendation
//! client so that the resilience policy can be tested independently of the
//! business logic that uses it.
//!
//! Time is abstracted behind the [`Sleeper`] trait: production code sleeps on the
//! tokio timer, tests plug in a recorder and never wait in real time.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff policy for retried operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for every further retry
    pub base_delay: Duration,

    /// Upper bound for the exponential part of the delay
    pub max_delay: Duration,

    /// Upper bound (exclusive) of the random jitter added to every delay
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2_000),
            max_delay: Duration::from_millis(60_000),
            jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy without jitter
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: Duration::ZERO,
        }
    }

    /// Set the jitter bound
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Exponential part of the delay applied before retry number `retry` (1-based)
    ///
    /// `base * 2^(retry - 1)`, capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let factor = 2_u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Full delay for retry number `retry`: capped backoff plus jitter in `[0, jitter)`
    pub fn delay_for<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let backoff = self.backoff(retry);
        if retry == 0 || self.jitter.is_zero() {
            return backoff;
        }

        let jitter_ms = rng.gen_range(0..self.jitter.as_millis().max(1) as u64);
        backoff + Duration::from_millis(jitter_ms)
    }
}

/// Abstraction over waiting, so delays are observable in tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for the given duration
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Observation of a single finished attempt
#[derive(Debug)]
pub struct AttemptReport<'a, E> {
    /// 1-based attempt number
    pub attempt: u32,

    /// Backoff that was applied before this attempt
    pub delay: Duration,

    /// Error returned by the attempt, `None` on success
    pub error: Option<&'a E>,

    /// Whether another attempt follows
    pub will_retry: bool,
}

/// Failure of a retried operation
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error
    Exhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error of the last attempt
        last: E,
    },

    /// An attempt failed with an error that must not be retried
    Aborted {
        /// Attempt that produced the error
        attempt: u32,
        /// The non-retryable error
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Aborted { attempt, .. } => *attempt,
        }
    }

    /// The last underlying error
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Aborted { error, .. } => error,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::Aborted { attempt, error } => {
                write!(f, "non-retryable failure on attempt {attempt}: {error}")
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Executes operations under a [`RetryPolicy`]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    rng: Mutex<ChaCha8Rng>,
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    /// Create a retrier with an entropy-seeded jitter source
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            policy,
            sleeper,
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    /// Create a retrier whose jitter sequence is reproducible
    pub fn with_seed(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>, seed: u64) -> Self {
        Self {
            policy,
            sleeper,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// The policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The sleeper used for backoff
    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    fn next_delay(&self, retry: u32) -> Duration {
        match self.rng.lock() {
            Ok(mut rng) => self.policy.delay_for(retry, &mut *rng),
            Err(poisoned) => {
                let mut rng = poisoned.into_inner();
                self.policy.delay_for(retry, &mut *rng)
            }
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent
    ///
    /// `operation` receives the 1-based attempt number. `should_retry` decides
    /// whether an error is transient. `on_attempt` observes every finished attempt.
    pub async fn run<T, E, F, Fut, P, O>(
        &self,
        mut operation: F,
        should_retry: P,
        mut on_attempt: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        O: FnMut(&AttemptReport<'_, E>),
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delay = Duration::ZERO;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                delay = self.next_delay(attempt - 1);
                debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying operation after delay"
                );
                self.sleeper.sleep(delay).await;
            }

            match operation(attempt).await {
                Ok(value) => {
                    on_attempt(&AttemptReport {
                        attempt,
                        delay,
                        error: None,
                        will_retry: false,
                    });
                    if attempt > 1 {
                        debug!(attempt = attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let retryable = should_retry(&error);
                    let will_retry = retryable && attempt < max_attempts;
                    on_attempt(&AttemptReport {
                        attempt,
                        delay,
                        error: Some(&error),
                        will_retry,
                    });

                    if !retryable {
                        warn!(attempt = attempt, error = %error, "Non-retryable error encountered");
                        return Err(RetryError::Aborted { attempt, error });
                    }

                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %error,
                        "Operation failed"
                    );

                    if !will_retry {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: error,
                        });
                    }
                }
            }
        }

        unreachable!("retry loop always returns from its final attempt")
    }
}
