//! Rate-limited fetcher
//!
//! Acquires the raw interest series of one keyword from a [`TrendProvider`]. Rate
//! limits and transient failures are retried under the configured
//! [`RetryPolicy`](crate::utils::retry::RetryPolicy); successive keywords are spaced
//! by a fixed pacing delay so the batch stays under the provider's global limit.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::metrics;
use crate::trends::error::{TrendError, TrendResult};
use crate::trends::provider::{ProviderError, TrendProvider, TrendQuery};
use crate::trends::types::{AttemptOutcome, FetchAttempt, RawSeries};
use crate::utils::retry::{AttemptReport, Retrier, Sleeper, TokioSleeper};

/// Fetches one keyword at a time with backoff and pacing
pub struct TrendFetcher {
    provider: Arc<dyn TrendProvider>,
    retrier: Retrier,
    pacing_delay: Duration,
}

impl std::fmt::Debug for TrendFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendFetcher")
            .field("provider", &self.provider.name())
            .field("retrier", &self.retrier)
            .field("pacing_delay", &self.pacing_delay)
            .finish()
    }
}

impl TrendFetcher {
    /// Create a fetcher from its parts
    pub fn new(provider: Arc<dyn TrendProvider>, retrier: Retrier, pacing_delay: Duration) -> Self {
        Self {
            provider,
            retrier,
            pacing_delay,
        }
    }

    /// Create a fetcher that waits on the tokio timer
    pub fn from_config(provider: Arc<dyn TrendProvider>, config: &FetchConfig) -> Self {
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        Self::new(
            provider,
            Retrier::new(config.retry_policy(), sleeper),
            config.pacing_delay(),
        )
    }

    /// Minimum wait between successive keywords
    pub fn pacing_delay(&self) -> Duration {
        self.pacing_delay
    }

    /// Wait the pacing delay before fetching the next keyword of a batch
    pub async fn pace(&self) {
        if self.pacing_delay.is_zero() {
            return;
        }
        debug!(delay_ms = self.pacing_delay.as_millis() as u64, "Pacing before next keyword");
        self.retrier.sleeper().sleep(self.pacing_delay).await;
    }

    /// Fetch the interest series of `keyword`
    ///
    /// # Errors
    ///
    /// - `TrendError::UpstreamUnavailable` when retries are exhausted or the provider
    ///   rejects the request
    /// - `TrendError::EmptySeries` when the provider has no usable data points
    pub async fn fetch(&self, keyword: &str, timeframe: &str, geo: &str) -> TrendResult<RawSeries> {
        self.fetch_observed(keyword, timeframe, geo, |_| {}).await
    }

    /// Like [`fetch`](Self::fetch), handing every [`FetchAttempt`] to `observer`
    pub async fn fetch_observed<O>(
        &self,
        keyword: &str,
        timeframe: &str,
        geo: &str,
        mut observer: O,
    ) -> TrendResult<RawSeries>
    where
        O: FnMut(&FetchAttempt),
    {
        let query = TrendQuery::new(keyword, timeframe, geo);

        let result = self
            .retrier
            .run(
                |_| self.provider.interest_over_time(&query),
                ProviderError::is_retryable,
                |report| {
                    let attempt = fetch_attempt(keyword, report);
                    log_attempt(&attempt, report);
                    metrics::record_fetch_attempt(attempt.outcome.as_str(), attempt.backoff);
                    observer(&attempt);
                },
            )
            .await;

        let points = match result {
            Ok(points) => points,
            Err(e) => {
                let attempts = e.attempts();
                let reason = e.into_inner().to_string();
                warn!(keyword = %keyword, attempts, reason = %reason, "Upstream unavailable");
                return Err(TrendError::UpstreamUnavailable {
                    keyword: keyword.to_string(),
                    attempts,
                    reason,
                });
            }
        };

        let series = RawSeries::from_points(keyword, points);
        if series.is_empty() {
            return Err(TrendError::EmptySeries {
                keyword: keyword.to_string(),
            });
        }

        info!(keyword = %keyword, points = series.len(), "Fetched interest series");
        Ok(series)
    }
}

fn fetch_attempt(keyword: &str, report: &AttemptReport<'_, ProviderError>) -> FetchAttempt {
    let outcome = match report.error {
        None => AttemptOutcome::Success,
        Some(e) if e.is_rate_limit() => AttemptOutcome::RateLimited,
        Some(_) => AttemptOutcome::Error,
    };

    FetchAttempt {
        keyword: keyword.to_string(),
        attempt: report.attempt,
        outcome,
        backoff: report.delay,
    }
}

fn log_attempt(attempt: &FetchAttempt, report: &AttemptReport<'_, ProviderError>) {
    let backoff_ms = attempt.backoff.as_millis() as u64;
    match report.error {
        None => debug!(
            keyword = %attempt.keyword,
            attempt = attempt.attempt,
            outcome = attempt.outcome.as_str(),
            backoff_ms,
            "Fetch attempt"
        ),
        Some(error) => warn!(
            keyword = %attempt.keyword,
            attempt = attempt.attempt,
            outcome = attempt.outcome.as_str(),
            backoff_ms,
            will_retry = report.will_retry,
            error = %error,
            "Fetch attempt failed"
        ),
    }
}
