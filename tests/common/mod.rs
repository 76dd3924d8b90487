//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atim::trends::{
    ConfidenceScorer, ProviderError, SeriesPoint, TrendAnalyzer, TrendClassifier, TrendFetcher,
    TrendProvider, TrendQuery,
};
use atim::utils::retry::{Retrier, RetryPolicy, Sleeper};

/// Rising scenario series
pub const RISING: [f64; 6] = [10.0, 12.0, 14.0, 40.0, 55.0, 60.0];

/// Declining scenario series
pub const DECLINING: [f64; 6] = [80.0, 78.0, 75.0, 40.0, 20.0, 10.0];

/// Flat, high-interest scenario series
pub const FLAT_HIGH: [f64; 6] = [70.0, 72.0, 69.0, 71.0, 70.0, 68.0];

/// Sleeper that records requested delays instead of waiting
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Weekly points starting at the epoch
pub fn points(values: &[f64]) -> Vec<SeriesPoint> {
    let origin = DateTime::<Utc>::default();
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| SeriesPoint::new(origin + ChronoDuration::weeks(i as i64), v))
        .collect()
}

type Scripted = VecDeque<Result<Vec<SeriesPoint>, ProviderError>>;

/// Provider replaying a fixed sequence of responses per keyword
///
/// Once a keyword's script is spent it answers with an empty series.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, keyword: &str, response: Result<Vec<SeriesPoint>, ProviderError>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(keyword.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn series(self, keyword: &str, values: &[f64]) -> Self {
        self.respond(keyword, Ok(points(values)))
    }

    pub fn fail_times(mut self, keyword: &str, times: usize, error: fn() -> ProviderError) -> Self {
        for _ in 0..times {
            self = self.respond(keyword, Err(error()));
        }
        self
    }

    /// Keywords in the order they were requested, one entry per call
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, keyword: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == keyword).count()
    }
}

#[async_trait]
impl TrendProvider for ScriptedProvider {
    async fn interest_over_time(&self, query: &TrendQuery) -> Result<Vec<SeriesPoint>, ProviderError> {
        self.calls.lock().unwrap().push(query.keyword.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&query.keyword)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Retry policy used across tests: 3 attempts, 100ms base, no jitter
pub fn test_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(5))
}

pub const PACING: Duration = Duration::from_millis(500);

/// Analyzer with default thresholds over `provider`, sleeping on `sleeper`
pub fn analyzer(provider: Arc<dyn TrendProvider>, sleeper: Arc<RecordingSleeper>) -> TrendAnalyzer {
    analyzer_with_limit(provider, sleeper, 15)
}

/// Like [`analyzer`] with a custom per-batch keyword limit
pub fn analyzer_with_limit(
    provider: Arc<dyn TrendProvider>,
    sleeper: Arc<RecordingSleeper>,
    max_keywords_per_batch: usize,
) -> TrendAnalyzer {
    TrendAnalyzer::new(
        TrendFetcher::new(provider, Retrier::with_seed(test_policy(), sleeper, 11), PACING),
        TrendClassifier::default(),
        ConfidenceScorer::default(),
        max_keywords_per_batch,
    )
}
