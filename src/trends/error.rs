//! Error types for the trend signal engine

use thiserror::Error;

/// Result type for trend operations
pub type TrendResult<T> = Result<T, TrendError>;

/// Errors raised while turning a keyword into a trend record
#[derive(Debug, Error)]
pub enum TrendError {
    /// Retries against the provider were exhausted, or it refused the request
    #[error("Upstream unavailable for '{keyword}' after {attempts} attempt(s): {reason}")]
    UpstreamUnavailable {
        keyword: String,
        attempts: u32,
        reason: String,
    },

    /// The provider returned no data points for the keyword
    #[error("Provider returned no data for '{keyword}'")]
    EmptySeries { keyword: String },

    /// The series is too short for feature computation
    #[error("Insufficient data for '{keyword}': need at least {needed} points, got {got}")]
    InsufficientData {
        keyword: String,
        needed: usize,
        got: usize,
    },

    /// Thresholds, weights or batch parameters are malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl TrendError {
    /// Create a configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Per-keyword failures are recovered by skipping the keyword
    pub fn is_keyword_failure(&self) -> bool {
        !matches!(self, Self::InvalidConfiguration(_))
    }
}
