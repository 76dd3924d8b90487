//! Confidence scorer & ranker
//!
//! Confidence is a weighted sum of normalized velocity magnitude and average
//! strength, penalized by volatility and clamped to [0, 100]. Stable trends are
//! damped by a configurable factor.

use crate::config::ScoringWeights;
use crate::trends::error::TrendResult;
use crate::trends::types::{TrendFeatures, TrendRecord, TrendState, MAX_INTEREST, MIN_INTEREST};

/// Largest population standard deviation of values bounded to [0, 100]
pub const MAX_VOLATILITY: f64 = 50.0;

/// Weighted confidence scorer
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: ScoringWeights,
}

impl ConfidenceScorer {
    /// Create a scorer, validating the weights
    ///
    /// # Errors
    ///
    /// Returns `TrendError::InvalidConfiguration` for malformed weights.
    pub fn new(weights: ScoringWeights) -> TrendResult<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Weights in use
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Confidence in [0, 100] for the given features and state
    pub fn score(&self, features: &TrendFeatures, state: TrendState) -> f64 {
        let w = &self.weights;

        let inputs = [features.velocity, features.average_strength, features.volatility];
        if inputs.iter().any(|x| !x.is_finite()) {
            return 0.0;
        }

        let velocity = (features.velocity.abs() / w.velocity_scale).min(1.0) * 100.0;
        let strength = features.average_strength.clamp(MIN_INTEREST, MAX_INTEREST);
        let noise = (features.volatility.abs() / MAX_VOLATILITY).min(1.0) * 100.0;

        let mut raw = w.velocity_weight * velocity + w.strength_weight * strength
            - w.volatility_penalty * noise;

        if state == TrendState::Stable {
            raw *= w.stable_factor;
        }

        if raw.is_finite() {
            raw.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

/// Filter to `confidence >= min_confidence` and sort descending by confidence
///
/// The sort is stable: records with equal confidence keep their input order.
pub fn rank(records: Vec<TrendRecord>, min_confidence: f64) -> Vec<TrendRecord> {
    let mut ranked: Vec<TrendRecord> = records
        .into_iter()
        .filter(|r| r.confidence >= min_confidence)
        .collect();

    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(keyword: &str, confidence: f64) -> TrendRecord {
        TrendRecord::new(TrendFeatures::new(keyword, 0.0, 50.0, 0.0), TrendState::Stable, confidence)
    }

    #[test]
    fn test_score_components() {
        let scorer = ConfidenceScorer::default();

        // 0.6 * 100 + 0.4 * 50 - 0.2 * 20
        let features = TrendFeatures::new("kw", 12.0, 50.0, 10.0);
        let score = scorer.score(&features, TrendState::Rising);
        assert!((score - 76.0).abs() < 1e-9);

        // Stable is damped by 0.8
        let stable = scorer.score(&features, TrendState::Stable);
        assert!((stable - 60.8).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_lowers_confidence() {
        let scorer = ConfidenceScorer::default();
        let calm = scorer.score(&TrendFeatures::new("kw", 5.0, 50.0, 2.0), TrendState::Rising);
        let noisy = scorer.score(&TrendFeatures::new("kw", 5.0, 50.0, 30.0), TrendState::Rising);
        assert!(noisy < calm);
    }

    #[test]
    fn test_score_clamped_and_finite() {
        let scorer = ConfidenceScorer::default();

        let low = scorer.score(&TrendFeatures::new("kw", 0.0, 0.0, 50.0), TrendState::Declining);
        assert_eq!(low, 0.0);

        let nan = scorer.score(&TrendFeatures::new("kw", f64::NAN, 50.0, 1.0), TrendState::Rising);
        assert_eq!(nan, 0.0);

        let high = scorer.score(&TrendFeatures::new("kw", 1e9, 1e9, 0.0), TrendState::Rising);
        assert!((high - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_sorts_and_filters() {
        let ranked = rank(
            vec![record("a", 10.0), record("b", 80.0), record("c", 45.0), record("d", 20.0)],
            20.0,
        );

        let keywords: Vec<_> = ranked.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_rank_is_stable() {
        let ranked = rank(
            vec![record("first", 50.0), record("top", 90.0), record("second", 50.0), record("third", 50.0)],
            0.0,
        );

        let keywords: Vec<_> = ranked.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["top", "first", "second", "third"]);
    }
}
