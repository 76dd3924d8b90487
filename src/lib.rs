//! atim - Automated Trend & Inventory Manager
//!
//! Watches search-interest trends for product keywords, classifies each keyword as
//! Rising, Peaking, Declining or Stable with a confidence score, and correlates the
//! ranked trends with inventory to produce restocking advice.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`trends`] - Rate-limited fetching, feature extraction, classification and ranking
//! - [`inventory`] - CSV inventory, low-stock alerts and trend correlation
//! - [`recommend`] - Recommendation payloads, LLM and rule-based advice
//! - [`report`] - HTML report rendering
//! - [`server`] - HTTP surface for batch analysis
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Retry with backoff and keyword helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use atim::config::Config;
//! use atim::trends::{GoogleTrendsProvider, TrendAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let provider = GoogleTrendsProvider::new(&config.fetch)?;
//!     let analyzer = TrendAnalyzer::from_config(Arc::new(provider), &config)?;
//!     let report = analyzer
//!         .analyze(&config.trends.default_keywords, &config.trends.timeframe, &config.trends.geo, 20.0)
//!         .await?;
//!     println!("{} trends ranked", report.records.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod recommend;
pub mod report;
pub mod server;
pub mod trends;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{AtimErrorTrait, Error, ErrorCategory, Result};
    pub use crate::inventory::{CsvInventory, InventoryItem, InventoryLookup, ProductAction};
    pub use crate::recommend::{Recommendation, RecommendationPayload, Recommender};
    pub use crate::trends::{
        BatchReport, TrendAnalyzer, TrendProvider, TrendRecord, TrendState,
    };
}

// Direct re-exports for convenience
pub use trends::{TrendRecord, TrendState};
