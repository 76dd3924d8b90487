//! Property-based tests for features, scoring and ranking

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use proptest::prelude::*;

use atim::trends::{
    compute_features, rank, ConfidenceScorer, ProviderError, RawSeries, TrendClassifier,
    TrendFeatures, TrendRecord, TrendState,
};
use common::{analyzer, RecordingSleeper, ScriptedProvider};

fn series(values: &[f64]) -> RawSeries {
    RawSeries::from_values("kw", DateTime::<Utc>::default(), ChronoDuration::weeks(1), values)
}

fn state() -> impl Strategy<Value = TrendState> {
    prop_oneof![
        Just(TrendState::Rising),
        Just(TrendState::Peaking),
        Just(TrendState::Declining),
        Just(TrendState::Stable),
    ]
}

/// Strictly increasing interest values within [0, 100]
fn increasing() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::btree_set(0u32..=100, 2..40)
        .prop_map(|set| set.into_iter().map(f64::from).collect())
}

fn record(index: usize, confidence: f64) -> TrendRecord {
    TrendRecord::new(
        TrendFeatures::new(format!("kw{index}"), 0.0, 50.0, 0.0),
        TrendState::Stable,
        confidence,
    )
}

proptest! {
    #[test]
    fn increasing_series_never_declining(values in increasing()) {
        let features = compute_features(&series(&values)).unwrap();
        prop_assert!(features.velocity > 0.0);

        let state = TrendClassifier::default().classify(&features);
        prop_assert_ne!(state, TrendState::Declining);
    }

    #[test]
    fn decreasing_series_never_rising(values in increasing()) {
        let values: Vec<f64> = values.into_iter().rev().collect();
        let features = compute_features(&series(&values)).unwrap();
        prop_assert!(features.velocity < 0.0);

        let state = TrendClassifier::default().classify(&features);
        prop_assert_ne!(state, TrendState::Rising);
    }

    #[test]
    fn confidence_within_bounds(
        velocity in -1.0e6..1.0e6f64,
        strength in -50.0..200.0f64,
        volatility in 0.0..500.0f64,
        state in state(),
    ) {
        let features = TrendFeatures::new("kw", velocity, strength, volatility);
        let confidence = ConfidenceScorer::default().score(&features, state);
        prop_assert!((0.0..=100.0).contains(&confidence));
    }

    #[test]
    fn confidence_within_bounds_for_any_float(
        velocity in any::<f64>(),
        strength in any::<f64>(),
        volatility in any::<f64>(),
        state in state(),
    ) {
        let features = TrendFeatures::new("kw", velocity, strength, volatility);
        let confidence = ConfidenceScorer::default().score(&features, state);
        prop_assert!((0.0..=100.0).contains(&confidence));
    }

    #[test]
    fn rank_is_sorted_and_stable(confidences in prop::collection::vec(0u8..=10, 0..30)) {
        // Coarse values force ties
        let records: Vec<TrendRecord> = confidences
            .iter()
            .enumerate()
            .map(|(i, &c)| record(i, f64::from(c) * 10.0))
            .collect();

        let ranked = rank(records, 0.0);
        prop_assert_eq!(ranked.len(), confidences.len());

        for pair in ranked.windows(2) {
            prop_assert!(pair[0].confidence >= pair[1].confidence);
            if pair[0].confidence == pair[1].confidence {
                let a: usize = pair[0].keyword[2..].parse().unwrap();
                let b: usize = pair[1].keyword[2..].parse().unwrap();
                prop_assert!(a < b, "ties must keep input order");
            }
        }
    }

    #[test]
    fn rank_respects_min_confidence(
        confidences in prop::collection::vec(0.0..=100.0f64, 0..30),
        min_confidence in 0.0..=100.0f64,
    ) {
        let records: Vec<TrendRecord> = confidences
            .iter()
            .enumerate()
            .map(|(i, &c)| record(i, c))
            .collect();

        let ranked = rank(records, min_confidence);
        prop_assert!(ranked.iter().all(|r| r.confidence >= min_confidence));

        let expected = confidences.iter().filter(|&&c| c >= min_confidence).count();
        prop_assert_eq!(ranked.len(), expected);
    }

    #[test]
    fn reversing_negates_velocity(values in increasing()) {
        let forward = compute_features(&series(&values)).unwrap();
        let reversed: Vec<f64> = values.iter().rev().copied().collect();
        let backward = compute_features(&series(&reversed)).unwrap();

        prop_assert!((forward.velocity + backward.velocity).abs() < 1e-9);
        prop_assert!((forward.average_strength - backward.average_strength).abs() < 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn failing_batches_never_error(failures in prop::collection::vec(0usize..4, 1..6)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let mut provider = ScriptedProvider::new();
        let mut keywords = Vec::new();
        for (i, &times) in failures.iter().enumerate() {
            let keyword = format!("kw{i}");
            provider = provider.fail_times(&keyword, times, || ProviderError::Transient("down".into()));
            keywords.push(keyword);
        }

        let analyzer = analyzer(Arc::new(provider), Arc::new(RecordingSleeper::default()));
        let report = runtime
            .block_on(analyzer.analyze(&keywords, "today 3-m", "US", 0.0))
            .unwrap();

        prop_assert!(report.is_empty());
        prop_assert_eq!(report.skipped_count(), keywords.len());
    }
}
