//! Batch orchestrator
//!
//! Drives fetch → features → classify → score over a keyword list, strictly in
//! input order and one keyword at a time. Per-keyword failures are collected as
//! skips; only configuration errors abort a batch.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::{validate_geo, validate_min_confidence, Config};
use crate::metrics;
use crate::trends::classifier::TrendClassifier;
use crate::trends::error::{TrendError, TrendResult};
use crate::trends::features::compute_features;
use crate::trends::fetcher::TrendFetcher;
use crate::trends::provider::TrendProvider;
use crate::trends::scorer::{rank, ConfidenceScorer};
use crate::trends::types::TrendRecord;
use crate::utils::normalize_keyword;

/// Why a keyword produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UpstreamUnavailable,
    EmptySeries,
    InsufficientData,
}

impl SkipReason {
    /// Reason for a per-keyword error; `None` for fatal errors
    pub fn from_error(error: &TrendError) -> Option<Self> {
        match error {
            TrendError::UpstreamUnavailable { .. } => Some(Self::UpstreamUnavailable),
            TrendError::EmptySeries { .. } => Some(Self::EmptySeries),
            TrendError::InsufficientData { .. } => Some(Self::InsufficientData),
            TrendError::InvalidConfiguration(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::EmptySeries => "empty_series",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A keyword left out of the result and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedKeyword {
    pub keyword: String,
    pub reason: SkipReason,
    /// Human-readable error message
    pub detail: String,
}

/// Result of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Ranked records at or above the confidence bar
    pub records: Vec<TrendRecord>,

    /// Keywords that could not be analyzed, in input order
    pub skipped: Vec<SkippedKeyword>,

    /// Distinct keywords attempted
    pub requested: usize,

    /// Keywords that produced a record, before confidence filtering
    pub analyzed: usize,

    /// Distinct keywords dropped by the per-batch limit
    pub truncated: usize,
}

impl BatchReport {
    /// Number of skipped keywords
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Whether no record met the confidence bar
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Analyzed records filtered out by the confidence bar
    pub fn below_threshold(&self) -> usize {
        self.analyzed.saturating_sub(self.records.len())
    }

    /// Number of skips with the given reason
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }
}

/// Normalize, de-duplicate and truncate a keyword list
///
/// Returns the keywords to analyze, in first-occurrence order, and the number of
/// distinct keywords dropped by `limit`.
pub fn prepare_keywords<S: AsRef<str>>(keywords: &[S], limit: usize) -> (Vec<String>, usize) {
    let mut seen = HashSet::new();
    let distinct: Vec<String> = keywords
        .iter()
        .map(|k| normalize_keyword(k.as_ref()))
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .collect();

    let dropped = distinct.len().saturating_sub(limit);
    (distinct.into_iter().take(limit).collect(), dropped)
}

/// Concatenate keyword lists, normalized and de-duplicated in first-occurrence order
pub fn merge_keywords<S: AsRef<str>>(base: &[S], additional: &[S]) -> Vec<String> {
    let all: Vec<&str> = base.iter().chain(additional).map(AsRef::as_ref).collect();
    prepare_keywords(&all, usize::MAX).0
}

/// Sequential batch analyzer
#[derive(Debug)]
pub struct TrendAnalyzer {
    fetcher: TrendFetcher,
    classifier: TrendClassifier,
    scorer: ConfidenceScorer,
    max_keywords_per_batch: usize,
}

impl TrendAnalyzer {
    pub fn new(
        fetcher: TrendFetcher,
        classifier: TrendClassifier,
        scorer: ConfidenceScorer,
        max_keywords_per_batch: usize,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            scorer,
            max_keywords_per_batch,
        }
    }

    /// Build the full pipeline from configuration
    ///
    /// # Errors
    ///
    /// Returns `TrendError::InvalidConfiguration` if any section is malformed.
    pub fn from_config(provider: Arc<dyn TrendProvider>, config: &Config) -> TrendResult<Self> {
        config.validate()?;

        Ok(Self::new(
            TrendFetcher::from_config(provider, &config.fetch),
            TrendClassifier::new(config.classifier.clone())?,
            ConfidenceScorer::new(config.scoring.clone())?,
            config.trends.max_keywords_per_batch,
        ))
    }

    /// Default per-batch keyword limit
    pub fn max_keywords_per_batch(&self) -> usize {
        self.max_keywords_per_batch
    }

    /// Analyze a batch with the default keyword limit
    pub async fn analyze<S: AsRef<str>>(
        &self,
        keywords: &[S],
        timeframe: &str,
        geo: &str,
        min_confidence: f64,
    ) -> TrendResult<BatchReport> {
        self.analyze_limited(keywords, self.max_keywords_per_batch, timeframe, geo, min_confidence)
            .await
    }

    /// Analyze a batch, keeping at most `limit` distinct keywords
    ///
    /// `limit` never lifts the configured per-batch limit.
    ///
    /// # Errors
    ///
    /// Only `TrendError::InvalidConfiguration`, raised before any fetch.
    #[instrument(skip(self, keywords), fields(keywords = keywords.len()))]
    pub async fn analyze_limited<S: AsRef<str>>(
        &self,
        keywords: &[S],
        limit: usize,
        timeframe: &str,
        geo: &str,
        min_confidence: f64,
    ) -> TrendResult<BatchReport> {
        validate_min_confidence(min_confidence)?;
        if limit == 0 {
            return Err(TrendError::invalid_config("keyword limit must be greater than 0"));
        }
        if timeframe.trim().is_empty() {
            return Err(TrendError::invalid_config("timeframe must not be empty"));
        }
        validate_geo(geo)?;

        let limit = limit.min(self.max_keywords_per_batch);
        let started = Instant::now();
        let (keywords, truncated) = prepare_keywords(keywords, limit);
        if truncated > 0 {
            warn!(limit, truncated, "Keyword list truncated to batch limit");
        }

        let mut records = Vec::with_capacity(keywords.len());
        let mut skipped = Vec::new();

        for (index, keyword) in keywords.iter().enumerate() {
            if index > 0 {
                self.fetcher.pace().await;
            }

            match self.analyze_keyword(keyword, timeframe, geo).await {
                Ok(record) => {
                    metrics::record_classification(record.state.as_str());
                    records.push(record);
                }
                Err(error) => {
                    let Some(reason) = SkipReason::from_error(&error) else {
                        return Err(error);
                    };
                    warn!(keyword = %keyword, reason = %reason, error = %error, "Skipping keyword");
                    metrics::record_keyword_skipped(reason.as_str());
                    skipped.push(SkippedKeyword {
                        keyword: keyword.clone(),
                        reason,
                        detail: error.to_string(),
                    });
                }
            }
        }

        let analyzed = records.len();
        let report = BatchReport {
            records: rank(records, min_confidence),
            skipped,
            requested: keywords.len(),
            analyzed,
            truncated,
        };

        let outcome = if analyzed > 0 { "ok" } else { "empty" };
        metrics::record_batch_duration(outcome, started.elapsed());

        info!(
            requested = report.requested,
            analyzed = report.analyzed,
            ranked = report.records.len(),
            skipped = report.skipped_count(),
            "Batch analysis complete"
        );

        Ok(report)
    }

    /// Run the full pipeline for one keyword
    async fn analyze_keyword(&self, keyword: &str, timeframe: &str, geo: &str) -> TrendResult<TrendRecord> {
        let series = self.fetcher.fetch(keyword, timeframe, geo).await?;
        let features = compute_features(&series)?;
        let state = self.classifier.classify(&features);
        let confidence = self.scorer.score(&features, state);

        info!(
            keyword = %keyword,
            state = %state,
            confidence,
            velocity = features.velocity,
            "Keyword classified"
        );

        Ok(TrendRecord::new(features, state, confidence))
    }
}
