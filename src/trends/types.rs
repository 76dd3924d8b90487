//! Data model of the trend signal engine
//!
//! A [`RawSeries`] is produced by the fetcher and consumed once by the feature
//! calculator. [`TrendFeatures`], [`TrendState`] and the resulting
//! [`TrendRecord`] are immutable once created and live for one analysis cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lowest interest value a provider reports
pub const MIN_INTEREST: f64 = 0.0;

/// Highest interest value a provider reports
pub const MAX_INTEREST: f64 = 100.0;

/// One sample of provider-normalized search interest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Start of the sampled interval
    pub timestamp: DateTime<Utc>,

    /// Interest value in [0, 100]
    pub value: f64,
}

impl SeriesPoint {
    /// Create a new point
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Chronologically ordered interest series for one keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    keyword: String,
    points: Vec<SeriesPoint>,
}

impl RawSeries {
    /// Build a series from provider points
    ///
    /// Points are sorted ascending by timestamp (stable for equal timestamps),
    /// non-finite values are dropped and the rest clamped to [0, 100].
    pub fn from_points(keyword: impl Into<String>, points: Vec<SeriesPoint>) -> Self {
        let mut points: Vec<SeriesPoint> = points
            .into_iter()
            .filter(|p| p.value.is_finite())
            .map(|p| SeriesPoint::new(p.timestamp, p.value.clamp(MIN_INTEREST, MAX_INTEREST)))
            .collect();
        points.sort_by_key(|p| p.timestamp);

        Self {
            keyword: keyword.into(),
            points,
        }
    }

    /// Build a series from values sampled at a fixed interval starting at `start`
    pub fn from_values(
        keyword: impl Into<String>,
        start: DateTime<Utc>,
        step: chrono::Duration,
        values: &[f64],
    ) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &value)| SeriesPoint::new(start + step * i as i32, value))
            .collect();
        Self::from_points(keyword, points)
    }

    /// Keyword this series belongs to
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Points in ascending time order
    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    /// Interest values in time order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Numeric trend features derived from a [`RawSeries`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFeatures {
    /// Keyword the features describe
    pub keyword: String,

    /// Signed rate of change of interest per sample interval
    pub velocity: f64,

    /// Mean interest level over the whole window
    pub average_strength: f64,

    /// Population standard deviation of interest values
    pub volatility: f64,

    /// Mean interest of the later half of the window
    pub recent_strength: f64,

    /// Most recent interest value
    pub current_value: f64,

    /// Highest interest value in the window
    pub peak_value: f64,

    /// Number of samples the features were computed from
    pub points: usize,
}

impl TrendFeatures {
    /// Features from explicit values, mostly useful for tests and fixtures
    pub fn new(keyword: impl Into<String>, velocity: f64, average_strength: f64, volatility: f64) -> Self {
        Self {
            keyword: keyword.into(),
            velocity,
            average_strength,
            volatility,
            recent_strength: average_strength,
            current_value: average_strength,
            peak_value: average_strength,
            points: 0,
        }
    }
}

/// Discrete trend state of a keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendState {
    /// Interest is climbing fast
    Rising,

    /// Interest is high but flattening
    Peaking,

    /// Interest is falling fast
    Declining,

    /// No significant movement
    Stable,
}

impl TrendState {
    /// All states in display order
    pub fn all() -> [Self; 4] {
        [Self::Rising, Self::Peaking, Self::Declining, Self::Stable]
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rising => "Rising",
            Self::Peaking => "Peaking",
            Self::Declining => "Declining",
            Self::Stable => "Stable",
        }
    }

    /// Arrow glyph used in terminal tables
    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Rising => "↗",
            Self::Peaking => "⇢",
            Self::Declining => "↘",
            Self::Stable => "→",
        }
    }
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rising" => Ok(Self::Rising),
            "peaking" => Ok(Self::Peaking),
            "declining" => Ok(Self::Declining),
            "stable" => Ok(Self::Stable),
            other => Err(format!("unknown trend state: {other}")),
        }
    }
}

/// Classified, confidence-scored trend of one keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    /// Keyword (unique within a batch)
    pub keyword: String,

    /// Classified state
    pub state: TrendState,

    /// Confidence in [0, 100]
    pub confidence: f64,

    /// Features the classification was based on
    pub features: TrendFeatures,
}

impl TrendRecord {
    /// Create a record
    pub fn new(features: TrendFeatures, state: TrendState, confidence: f64) -> Self {
        Self {
            keyword: features.keyword.clone(),
            state,
            confidence,
            features,
        }
    }
}

/// Outcome of a single upstream request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    Error,
}

impl AttemptOutcome {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
        }
    }
}

/// Transient record of one request made while fetching a keyword
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub keyword: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// Backoff applied before this attempt
    pub backoff: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_series_sorted_and_clamped() {
        let series = RawSeries::from_points(
            "boots",
            vec![
                SeriesPoint::new(ts(3), 130.0),
                SeriesPoint::new(ts(1), -5.0),
                SeriesPoint::new(ts(2), f64::NAN),
                SeriesPoint::new(ts(2), 50.0),
            ],
        );

        assert_eq!(series.len(), 3);
        assert_eq!(series.values(), vec![0.0, 50.0, 100.0]);
        assert_eq!(series.points()[0].timestamp, ts(1));
    }

    #[test]
    fn test_series_from_values() {
        let series = RawSeries::from_values("loafers", ts(1), chrono::Duration::days(7), &[1.0, 2.0, 3.0]);
        assert_eq!(series.keyword(), "loafers");
        assert_eq!(series.points()[2].timestamp, ts(15));
    }

    #[test]
    fn test_trend_state_round_trip_names() {
        for state in TrendState::all() {
            assert_eq!(state.as_str().parse::<TrendState>().unwrap(), state);
        }
        assert!("unknown".parse::<TrendState>().is_err());
    }

    #[test]
    fn test_record_takes_keyword_from_features() {
        let record = TrendRecord::new(TrendFeatures::new("espadrilles", 1.0, 40.0, 3.0), TrendState::Stable, 20.0);
        assert_eq!(record.keyword, "espadrilles");
    }
}
