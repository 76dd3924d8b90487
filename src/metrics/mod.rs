//! Prometheus metrics for the trend engine
//!
//! This module provides metrics tracking for:
//! - Fetcher: upstream attempts per outcome, applied backoff delays
//! - Orchestrator: skipped keywords per reason, classified states, batch duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, or it is never called, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all trend engine metrics
struct TrendMetrics {
    fetch_attempts: CounterVec,
    backoff_seconds: Histogram,
    keywords_skipped: CounterVec,
    trends_classified: CounterVec,
    batch_duration: HistogramVec,
}

/// Global storage for trend metrics
static TREND_METRICS: OnceLock<TrendMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Serializes concurrent initialization
static INIT_LOCK: Mutex<()> = Mutex::new(());

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// Subsequent calls are no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = atim::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = TrendMetrics {
        fetch_attempts: register_counter_vec!(
            "atim_fetch_attempts_total",
            "Total upstream fetch attempts by outcome",
            &["outcome"]
        )?,
        backoff_seconds: register_histogram!(
            "atim_backoff_seconds",
            "Backoff delay applied before a retried fetch in seconds",
            vec![0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]
        )?,
        keywords_skipped: register_counter_vec!(
            "atim_keywords_skipped_total",
            "Total keywords skipped in a batch by reason",
            &["reason"]
        )?,
        trends_classified: register_counter_vec!(
            "atim_trends_classified_total",
            "Total keywords classified by trend state",
            &["state"]
        )?,
        batch_duration: register_histogram_vec!(
            "atim_batch_duration_seconds",
            "Wall time of a batch analysis in seconds",
            &["outcome"],
            vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
        )?,
    };

    TREND_METRICS
        .set(metrics)
        .map_err(|_| "Trend metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    TREND_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one upstream attempt and the backoff that preceded it
pub fn record_fetch_attempt(outcome: &str, backoff: Duration) {
    let Some(m) = TREND_METRICS.get() else {
        return;
    };

    m.fetch_attempts.with_label_values(&[outcome]).inc();

    if !backoff.is_zero() {
        m.backoff_seconds.observe(backoff.as_secs_f64());
    }
}

/// Record a skipped keyword
pub fn record_keyword_skipped(reason: &str) {
    if let Some(m) = TREND_METRICS.get() {
        m.keywords_skipped.with_label_values(&[reason]).inc();
    }
}

/// Record a classified keyword
pub fn record_classification(state: &str) {
    if let Some(m) = TREND_METRICS.get() {
        m.trends_classified.with_label_values(&[state]).inc();
    }
}

/// Record the duration of a batch run
///
/// `outcome` is `"ok"` when at least one keyword was analyzed, `"empty"` otherwise.
pub fn record_batch_duration(outcome: &str, duration: Duration) {
    if let Some(m) = TREND_METRICS.get() {
        m.batch_duration
            .with_label_values(&[outcome])
            .observe(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init_idempotent() {
        let first = init_metrics();
        let second = init_metrics();

        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[test]
    fn test_recording_and_encoding() {
        let _ = init_metrics();

        record_fetch_attempt("rate_limited", Duration::from_secs(2));
        record_fetch_attempt("success", Duration::ZERO);
        record_keyword_skipped("empty_series");
        record_classification("Rising");
        record_batch_duration("ok", Duration::from_secs(4));

        let text = encode_metrics().unwrap();
        assert!(text.contains("atim_fetch_attempts_total"));
        assert!(text.contains("atim_keywords_skipped_total"));
        assert!(text.contains("atim_trends_classified_total"));
    }
}
