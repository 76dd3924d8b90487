//! Trend signal engine
//!
//! Turns noisy, rate-limited search-interest samples into classified,
//! confidence-scored and ranked trend records.
//!
//! # Pipeline
//!
//! ```text
//! keywords ─▶ TrendFetcher ─▶ RawSeries ─▶ compute_features ─▶ TrendFeatures
//!    (paced, retried)                                               │
//!                         TrendRecord ◀─ ConfidenceScorer ◀─ TrendClassifier
//!                              │
//!                         rank / filter ─▶ BatchReport
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use atim::config::Config;
//! use atim::trends::{StaticTrendProvider, TrendAnalyzer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = StaticTrendProvider::new().with_values("boots", &[10.0, 12.0, 14.0, 40.0, 55.0, 60.0]);
//! let analyzer = TrendAnalyzer::from_config(Arc::new(provider), &Config::default())?;
//! let report = analyzer.analyze(&["boots"], "today 3-m", "US", 20.0).await?;
//! println!("{} ranked, {} skipped", report.records.len(), report.skipped_count());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod classifier;
pub mod error;
pub mod features;
pub mod fetcher;
pub mod provider;
pub mod scorer;
pub mod types;

pub use analyzer::{
    merge_keywords, prepare_keywords, BatchReport, SkipReason, SkippedKeyword, TrendAnalyzer,
};
pub use classifier::TrendClassifier;
pub use error::{TrendError, TrendResult};
pub use features::compute_features;
pub use fetcher::TrendFetcher;
pub use provider::{GoogleTrendsProvider, ProviderError, StaticTrendProvider, TrendProvider, TrendQuery};
pub use scorer::{rank, ConfidenceScorer};
pub use types::{
    AttemptOutcome, FetchAttempt, RawSeries, SeriesPoint, TrendFeatures, TrendRecord, TrendState,
};
