//! Configuration management for atim
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files. Every tunable of the trend engine lives here and is passed to the
//! components at construction; nothing reads global state at analysis time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::trends::error::{TrendError, TrendResult};
use crate::utils::retry::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch-level trend analysis settings
    pub trends: TrendsConfig,

    /// Classification thresholds
    pub classifier: ClassifierThresholds,

    /// Confidence scoring weights
    pub scoring: ScoringWeights,

    /// Upstream fetching, backoff and pacing
    pub fetch: FetchConfig,

    /// LLM endpoint for recommendations
    pub llm: LlmConfig,

    /// Recommendation context
    pub recommendation: RecommendationConfig,

    /// Inventory source
    pub inventory: InventoryConfig,

    /// HTML report output
    pub report: ReportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP server configuration
    pub server: ServerConfig,
}

/// Batch-level trend analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendsConfig {
    /// Provider timeframe, e.g. "today 3-m"
    pub timeframe: String,

    /// Provider geo code, e.g. "US"; empty for worldwide
    pub geo: String,

    /// Keywords beyond this count are not analyzed
    pub max_keywords_per_batch: usize,

    /// Default minimum confidence for ranked output
    pub min_confidence: f64,

    /// Keywords analyzed when no inventory is available
    pub default_keywords: Vec<String>,
}

/// Footwear keywords used when no inventory is loaded
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "chunky sneakers",
    "waterproof boots",
    "espadrilles",
    "ankle boots",
    "retro runners",
    "platform sandals",
    "minimalist running shoes",
    "suede boots",
    "canvas shoes",
    "running sneakers",
    "hiking boots",
    "dress shoes",
    "loafers",
    "high top sneakers",
    "slip on shoes",
];

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            timeframe: String::from("today 3-m"),
            geo: String::from("US"),
            max_keywords_per_batch: 15,
            min_confidence: 20.0,
            default_keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl TrendsConfig {
    /// Validate batch settings
    pub fn validate(&self) -> TrendResult<()> {
        if self.timeframe.trim().is_empty() {
            return Err(TrendError::invalid_config("timeframe must not be empty"));
        }

        validate_geo(&self.geo)?;

        if self.max_keywords_per_batch == 0 {
            return Err(TrendError::invalid_config(
                "max_keywords_per_batch must be greater than 0",
            ));
        }

        validate_min_confidence(self.min_confidence)
    }
}

/// Check a provider region code: empty for worldwide, else alphanumeric with dashes
pub fn validate_geo(geo: &str) -> TrendResult<()> {
    if !geo.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(TrendError::invalid_config(format!(
            "geo '{geo}' must be empty or an alphanumeric region code"
        )));
    }
    Ok(())
}

/// Check a minimum confidence bar
pub fn validate_min_confidence(min_confidence: f64) -> TrendResult<()> {
    if !min_confidence.is_finite() || !(0.0..=100.0).contains(&min_confidence) {
        return Err(TrendError::invalid_config(format!(
            "min_confidence must be within [0, 100], got {min_confidence}"
        )));
    }
    Ok(())
}

/// Thresholds that decide the trend state boundaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Velocity (interest points per sample) beyond which a trend is directional
    pub velocity_high: f64,

    /// Average strength at or above which a flat trend counts as peaking
    pub strength_high: f64,

    /// Largest |velocity| still considered flat
    pub epsilon: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            velocity_high: 2.0,
            strength_high: 60.0,
            epsilon: 1.0,
        }
    }
}

impl ClassifierThresholds {
    /// Validate threshold consistency
    pub fn validate(&self) -> TrendResult<()> {
        if !(self.velocity_high.is_finite() && self.strength_high.is_finite() && self.epsilon.is_finite()) {
            return Err(TrendError::invalid_config("classifier thresholds must be finite"));
        }

        if self.velocity_high <= 0.0 {
            return Err(TrendError::invalid_config("velocity_high must be positive"));
        }

        if self.epsilon < 0.0 || self.epsilon >= self.velocity_high {
            return Err(TrendError::invalid_config(format!(
                "epsilon must be within [0, velocity_high), got {} with velocity_high {}",
                self.epsilon, self.velocity_high
            )));
        }

        if self.strength_high <= 0.0 || self.strength_high > 100.0 {
            return Err(TrendError::invalid_config(
                "strength_high must be within (0, 100]",
            ));
        }

        Ok(())
    }
}

/// Weights of the confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Weight of normalized |velocity|
    pub velocity_weight: f64,

    /// Weight of average strength
    pub strength_weight: f64,

    /// Penalty weight of normalized volatility
    pub volatility_penalty: f64,

    /// |velocity| that maps to a full velocity component
    pub velocity_scale: f64,

    /// Multiplier applied to stable trends
    pub stable_factor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            velocity_weight: 0.6,
            strength_weight: 0.4,
            volatility_penalty: 0.2,
            velocity_scale: 10.0,
            stable_factor: 0.8,
        }
    }
}

impl ScoringWeights {
    /// Validate weights
    pub fn validate(&self) -> TrendResult<()> {
        let all = [
            ("velocity_weight", self.velocity_weight),
            ("strength_weight", self.strength_weight),
            ("volatility_penalty", self.volatility_penalty),
            ("velocity_scale", self.velocity_scale),
            ("stable_factor", self.stable_factor),
        ];

        for (name, value) in all {
            if !value.is_finite() || value < 0.0 {
                return Err(TrendError::invalid_config(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }

        if self.velocity_weight + self.strength_weight <= 0.0 {
            return Err(TrendError::invalid_config(
                "velocity_weight and strength_weight must not both be zero",
            ));
        }

        if self.velocity_scale <= 0.0 {
            return Err(TrendError::invalid_config("velocity_scale must be positive"));
        }

        if self.stable_factor > 1.0 {
            return Err(TrendError::invalid_config("stable_factor must be within [0, 1]"));
        }

        Ok(())
    }
}

/// Upstream fetching, backoff and pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Base URL of the trends provider
    pub endpoint: String,

    /// Interface language sent to the provider
    pub hl: String,

    /// Timezone offset in minutes sent to the provider
    pub tz_offset_minutes: i32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Hard ceiling on raw requests per minute
    pub requests_per_minute: u32,

    /// Total attempts per keyword, including the first
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,

    /// Cap on the exponential part of the backoff in milliseconds
    pub max_delay_ms: u64,

    /// Upper bound of random jitter in milliseconds
    pub jitter_ms: u64,

    /// Minimum wait between successive keyword fetches in milliseconds
    pub pacing_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://trends.google.com"),
            hl: String::from("en-US"),
            tz_offset_minutes: 360,
            request_timeout_secs: 30,
            requests_per_minute: 30,
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
            jitter_ms: 1_000,
            pacing_delay_ms: 3_000,
        }
    }
}

impl FetchConfig {
    /// Validate fetch settings
    pub fn validate(&self) -> TrendResult<()> {
        if self.max_attempts == 0 {
            return Err(TrendError::invalid_config("max_attempts must be at least 1"));
        }

        if self.base_delay_ms == 0 {
            return Err(TrendError::invalid_config("base_delay_ms must be positive"));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(TrendError::invalid_config(
                "max_delay_ms must not be smaller than base_delay_ms",
            ));
        }

        if self.jitter_ms > self.base_delay_ms {
            return Err(TrendError::invalid_config(
                "jitter_ms must not exceed base_delay_ms",
            ));
        }

        if self.requests_per_minute == 0 {
            return Err(TrendError::invalid_config(
                "requests_per_minute must be greater than 0",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(TrendError::invalid_config(
                "request_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Backoff policy for per-keyword retries
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(Duration::from_millis(self.jitter_ms))
    }

    /// Wait between successive keyword fetches
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration for the LLM client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama endpoint URL
    pub endpoint: String,

    /// Model name to use
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for generation (0.0 - 1.0)
    pub temperature: f32,

    /// Attempts for transient failures
    pub max_attempts: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://localhost:11434"),
            model: String::from("qwen2.5:7b"),
            timeout_secs: 120,
            max_tokens: 2048,
            temperature: 0.4,
            max_attempts: 3,
        }
    }
}

/// Context handed to the recommendation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Season name; derived from the current month when unset
    pub season: Option<String>,

    /// Upcoming holidays and events
    pub holidays: Vec<String>,

    /// Use the LLM; falls back to rule-based advice otherwise
    pub use_llm: bool,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            season: None,
            holidays: vec![
                String::from("Labor Day"),
                String::from("Back to School"),
                String::from("Fall Fashion Week"),
            ],
            use_llm: true,
        }
    }
}

/// Inventory source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Inventory CSV file
    pub csv_path: PathBuf,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data/inventory.csv"),
        }
    }
}

/// HTML report output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory reports are written to
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind_address: SocketAddr,

    /// Enable permissive CORS
    pub enable_cors: bool,

    /// Enable per-request tracing
    pub enable_request_logging: bool,

    /// Largest accepted inventory upload in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
            enable_cors: true,
            enable_request_logging: true,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Config {
    /// Load configuration from defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let mut config = Self::from_file(path)?;
                config.apply_env();
                config
            }
            None => Self::from_env()?,
        };

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Override fields from `ATIM_*` / `OLLAMA_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(timeframe) = std::env::var("ATIM_TIMEFRAME") {
            self.trends.timeframe = timeframe;
        }
        if let Ok(geo) = std::env::var("ATIM_GEO") {
            self.trends.geo = geo;
        }
        if let Some(max) = env_parse("ATIM_MAX_KEYWORDS") {
            self.trends.max_keywords_per_batch = max;
        }
        if let Some(min) = env_parse("ATIM_MIN_CONFIDENCE") {
            self.trends.min_confidence = min;
        }

        if let Ok(endpoint) = std::env::var("ATIM_TRENDS_ENDPOINT") {
            self.fetch.endpoint = endpoint;
        }
        if let Some(attempts) = env_parse("ATIM_MAX_ATTEMPTS") {
            self.fetch.max_attempts = attempts;
        }
        if let Some(pacing) = env_parse("ATIM_PACING_MS") {
            self.fetch.pacing_delay_ms = pacing;
        }

        if let Ok(endpoint) = std::env::var("OLLAMA_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Some(timeout) = env_parse("OLLAMA_TIMEOUT") {
            self.llm.timeout_secs = timeout;
        }

        if let Ok(season) = std::env::var("ATIM_SEASON") {
            self.recommendation.season = Some(season);
        }
        if let Ok(path) = std::env::var("ATIM_INVENTORY_CSV") {
            self.inventory.csv_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("ATIM_REPORT_DIR") {
            self.report.output_dir = PathBuf::from(dir);
        }

        if let Ok(level) = std::env::var("ATIM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ATIM_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(addr) = env_parse("ATIM_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Some(bytes) = env_parse("ATIM_MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = bytes;
        }
    }

    /// Validate every section consumed by the trend engine
    pub fn validate(&self) -> TrendResult<()> {
        self.trends.validate()?;
        self.classifier.validate()?;
        self.scoring.validate()?;
        self.fetch.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [trends]
            geo = "GB"

            [classifier]
            epsilon = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.trends.geo, "GB");
        assert_eq!(config.trends.timeframe, "today 3-m");
        assert_eq!(config.classifier.epsilon, 0.5);
        assert_eq!(config.classifier.velocity_high, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_epsilon_must_stay_below_velocity_high() {
        let mut config = Config::default();
        config.classifier.epsilon = 2.0;
        assert!(matches!(
            config.validate(),
            Err(TrendError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = Config::default();
        config.scoring.strength_weight = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scoring.velocity_scale = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jitter_bounded_by_base_delay() {
        let mut config = Config::default();
        config.fetch.jitter_ms = config.fetch.base_delay_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_confidence_bounds() {
        assert!(validate_min_confidence(0.0).is_ok());
        assert!(validate_min_confidence(100.0).is_ok());
        assert!(validate_min_confidence(-1.0).is_err());
        assert!(validate_min_confidence(f64::INFINITY).is_err());
    }

    #[test]
    fn test_geo_validation() {
        let mut trends = TrendsConfig::default();
        trends.geo = String::new();
        assert!(trends.validate().is_ok());
        trends.geo = "US-CA".to_string();
        assert!(trends.validate().is_ok());
        trends.geo = "US;drop".to_string();
        assert!(trends.validate().is_err());
    }

    #[test]
    fn test_retry_policy_conversion() {
        let fetch = FetchConfig::default();
        let policy = fetch.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.jitter, Duration::from_secs(1));
        assert_eq!(fetch.pacing_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_recommendation_defaults() {
        let config = Config::default();
        assert!(config.recommendation.use_llm);
        assert_eq!(config.recommendation.holidays.len(), 3);
        assert_eq!(config.trends.default_keywords.len(), DEFAULT_KEYWORDS.len());
    }
}
