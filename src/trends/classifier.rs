//! Trend classifier
//!
//! Maps [`TrendFeatures`] onto exactly one [`TrendState`]. Rules are checked from the
//! most specific to the least specific state:
//!
//! | State     | Condition |
//! |-----------|-----------|
//! | Rising    | `velocity > velocity_high` and `recent_strength > average_strength` |
//! | Peaking   | `average_strength >= strength_high` and `abs(velocity) <= epsilon` |
//! | Declining | `velocity < -velocity_high` |
//! | Stable    | otherwise |

use crate::config::ClassifierThresholds;
use crate::trends::error::TrendResult;
use crate::trends::types::{TrendFeatures, TrendState};

/// Threshold-based trend classifier
#[derive(Debug, Clone, Default)]
pub struct TrendClassifier {
    thresholds: ClassifierThresholds,
}

impl TrendClassifier {
    /// Create a classifier, validating the thresholds
    ///
    /// # Errors
    ///
    /// Returns `TrendError::InvalidConfiguration` for inconsistent thresholds.
    pub fn new(thresholds: ClassifierThresholds) -> TrendResult<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    /// Thresholds in use
    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    /// Classify features into a trend state
    pub fn classify(&self, features: &TrendFeatures) -> TrendState {
        let t = &self.thresholds;
        let velocity = features.velocity;

        if velocity > t.velocity_high && features.recent_strength > features.average_strength {
            TrendState::Rising
        } else if features.average_strength >= t.strength_high && velocity.abs() <= t.epsilon {
            TrendState::Peaking
        } else if velocity < -t.velocity_high {
            TrendState::Declining
        } else {
            TrendState::Stable
        }
    }
}
