//! Unified error handling for the atim crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while keeping the domain errors usable on
//! their own.
//!
//! # Architecture
//!
//! - [`AtimErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use atim::error::{AtimErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Skipping: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::inventory::InventoryError;
pub use crate::recommend::RecommendError;
pub use crate::report::ReportError;
pub use crate::trends::error::TrendError;
pub use crate::trends::provider::ProviderError;

/// Common trait for all atim error types
pub trait AtimErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the run can continue without the failed unit)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Upstream provider and HTTP errors
    Network,
    /// Malformed input data
    Data,
    /// File and I/O errors
    Storage,
    /// LLM and recommendation errors
    Llm,
    /// Configuration and validation errors
    Config,
    /// Report rendering errors
    Rendering,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Data => "data",
            Self::Storage => "storage",
            Self::Llm => "llm",
            Self::Config => "config",
            Self::Rendering => "rendering",
            Self::Other => "other",
        }
    }
}

impl AtimErrorTrait for TrendError {
    fn is_recoverable(&self) -> bool {
        self.is_keyword_failure()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::UpstreamUnavailable { .. } => ErrorCategory::Network,
            Self::EmptySeries { .. } | Self::InsufficientData { .. } => ErrorCategory::Data,
            Self::InvalidConfiguration(_) => ErrorCategory::Config,
        }
    }
}

impl AtimErrorTrait for ProviderError {
    fn is_recoverable(&self) -> bool {
        self.is_retryable()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited | Self::Transient(_) | Self::Rejected(_) => ErrorCategory::Network,
            Self::Decode(_) => ErrorCategory::Data,
            Self::Setup(_) => ErrorCategory::Config,
        }
    }
}

/// Unified error type for the atim crate
#[derive(Error, Debug)]
pub enum Error {
    /// Trend engine errors
    #[error("Trend error: {0}")]
    Trend(#[from] TrendError),

    /// Upstream provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Inventory loading and saving errors
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Recommendation errors
    #[error("Recommendation error: {0}")]
    Recommend(#[from] RecommendError),

    /// Report rendering errors
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl AtimErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Trend(e) => e.is_recoverable(),
            Self::Provider(e) => e.is_recoverable(),
            Self::Inventory(e) => e.is_recoverable(),
            Self::Recommend(e) => e.is_recoverable(),
            Self::Report(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Trend(e) => e.category(),
            Self::Provider(e) => e.category(),
            Self::Inventory(e) => e.category(),
            Self::Recommend(e) => e.category(),
            Self::Report(_) => ErrorCategory::Rendering,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Data,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::Trend(TrendError::UpstreamUnavailable {
            keyword: "boots".into(),
            attempts: 5,
            reason: "rate limited".into(),
        });
        assert_eq!(err.category(), ErrorCategory::Network);

        let err = Error::Trend(TrendError::EmptySeries { keyword: "boots".into() });
        assert_eq!(err.category(), ErrorCategory::Data);
    }

    #[test]
    fn test_keyword_failures_recoverable() {
        let err: Error = TrendError::InsufficientData {
            keyword: "boots".into(),
            needed: 2,
            got: 1,
        }
        .into();
        assert!(err.is_recoverable());

        let err: Error = TrendError::invalid_config("epsilon too large").into();
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_provider_error_conversion() {
        let unified: Error = ProviderError::RateLimited.into();
        assert!(matches!(unified, Error::Provider(_)));
        assert!(unified.is_recoverable());

        let unified: Error = ProviderError::Rejected(403).into();
        assert!(!unified.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing inventory path");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(ErrorCategory::Other.as_str(), "other");
    }
}
