//! Upstream search-interest providers
//!
//! The fetcher only needs the capability "given keyword, timeframe and geo, return a
//! series or a classified failure". [`TrendProvider`] is that seam:
//! - [`GoogleTrendsProvider`] speaks the public Google Trends web protocol
//! - [`StaticTrendProvider`] serves fixed series for offline runs and fixtures

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client, StatusCode,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::FetchConfig;
use crate::trends::types::SeriesPoint;
use crate::utils::normalize_keyword;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Widget id of the interest-over-time chart in an explore response
const TIMESERIES_WIDGET: &str = "TIMESERIES";

/// Classified failure of a single provider request
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider signalled rate limiting (HTTP 429)
    #[error("Rate limited by provider")]
    RateLimited,

    /// Server error, timeout or connection failure
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The provider refused the request; retrying will not help
    #[error("Request rejected by provider with status {0}")]
    Rejected(u16),

    /// The response could not be understood
    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    /// The provider could not be set up or read
    #[error("Provider setup failed: {0}")]
    Setup(String),
}

impl ProviderError {
    /// Whether the failed request may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient(_))
    }

    /// Whether this is a rate-limit signal
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Classify an HTTP status code; `None` for success
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            None
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Some(Self::RateLimited)
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            Some(Self::Transient(format!("server returned {status}")))
        } else {
            Some(Self::Rejected(status.as_u16()))
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_body() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::Setup(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

/// Parameters of one interest-over-time request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendQuery {
    pub keyword: String,
    /// Provider timeframe, e.g. "today 3-m"
    pub timeframe: String,
    /// Region code, empty for worldwide
    pub geo: String,
}

impl TrendQuery {
    pub fn new(keyword: impl Into<String>, timeframe: impl Into<String>, geo: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            timeframe: timeframe.into(),
            geo: geo.into(),
        }
    }
}

/// Source of search-interest time series
#[async_trait]
pub trait TrendProvider: Send + Sync {
    /// Fetch interest over time for one keyword
    ///
    /// An empty vector means the provider has no data for the keyword.
    async fn interest_over_time(&self, query: &TrendQuery) -> Result<Vec<SeriesPoint>, ProviderError>;

    /// Short provider name for logs
    fn name(&self) -> &'static str;
}

// ============================================================================
// Google Trends
// ============================================================================

/// Google Trends web client
///
/// Every query is two requests: `explore` hands out widget tokens, then the
/// `TIMESERIES` widget request is replayed against `widgetdata/multiline`.
pub struct GoogleTrendsProvider {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    base_url: String,
    hl: String,
    tz: i32,
}

impl GoogleTrendsProvider {
    /// Create a provider from fetch settings
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Setup` if the HTTP client cannot be created
    pub fn new(config: &FetchConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        if let Ok(lang) = HeaderValue::from_str(&config.hl) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Setup(e.to_string()))?;

        let rate = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_minute(rate));

        Ok(Self {
            client,
            rate_limiter,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            hl: config.hl.clone(),
            tz: config.tz_offset_minutes,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{path}", self.base_url);
        let tz = self.tz.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("hl", self.hl.as_str()), ("tz", tz.as_str())])
            .query(query)
            .send()
            .await?;

        if let Some(error) = ProviderError::from_status(response.status()) {
            debug!(url = %url, status = %response.status(), "Provider returned error status");
            return Err(error);
        }

        let body = response.text().await?;
        parse_guarded_json(&body)
    }

    async fn explore(&self, query: &TrendQuery) -> Result<(Value, String), ProviderError> {
        let req = json!({
            "comparisonItem": [{
                "keyword": query.keyword,
                "geo": query.geo,
                "time": query.timeframe,
            }],
            "category": 0,
            "property": "",
        });

        let explore = self
            .get_json("/trends/api/explore", &[("req", req.to_string())])
            .await?;

        timeseries_widget(&explore)
    }
}

#[async_trait]
impl TrendProvider for GoogleTrendsProvider {
    #[instrument(skip(self), fields(keyword = %query.keyword))]
    async fn interest_over_time(&self, query: &TrendQuery) -> Result<Vec<SeriesPoint>, ProviderError> {
        let (request, token) = self.explore(query).await?;

        let data = self
            .get_json(
                "/trends/api/widgetdata/multiline",
                &[("req", request.to_string()), ("token", token)],
            )
            .await?;

        parse_timeline(&data)
    }

    fn name(&self) -> &'static str {
        "google-trends"
    }
}

/// Strip the anti-hijacking prefix (`)]}'` or `)]}',`) and parse the JSON body
pub fn parse_guarded_json(body: &str) -> Result<Value, ProviderError> {
    let start = body
        .find('{')
        .ok_or_else(|| ProviderError::Decode("response contains no JSON object".to_string()))?;

    serde_json::from_str(&body[start..]).map_err(|e| ProviderError::Decode(e.to_string()))
}

/// Extract the request and token of the `TIMESERIES` widget
fn timeseries_widget(explore: &Value) -> Result<(Value, String), ProviderError> {
    let widgets = explore
        .get("widgets")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Decode("explore response has no widgets".to_string()))?;

    let widget = widgets
        .iter()
        .find(|w| w.get("id").and_then(Value::as_str) == Some(TIMESERIES_WIDGET))
        .ok_or_else(|| ProviderError::Decode("explore response has no TIMESERIES widget".to_string()))?;

    let token = widget
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Decode("TIMESERIES widget has no token".to_string()))?;

    let request = widget
        .get("request")
        .cloned()
        .ok_or_else(|| ProviderError::Decode("TIMESERIES widget has no request".to_string()))?;

    Ok((request, token.to_string()))
}

#[derive(Debug, Deserialize)]
struct MultilineResponse {
    default: TimelineBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineBody {
    #[serde(default)]
    timeline_data: Vec<TimelineEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineEntry {
    time: String,
    #[serde(default)]
    value: Vec<f64>,
    #[serde(default)]
    is_partial: bool,
}

/// Convert a `widgetdata/multiline` response into series points
///
/// The trailing partial interval is kept; entries without a value are dropped.
fn parse_timeline(data: &Value) -> Result<Vec<SeriesPoint>, ProviderError> {
    let parsed: MultilineResponse =
        serde_json::from_value(data.clone()).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let mut points = Vec::with_capacity(parsed.default.timeline_data.len());
    for entry in parsed.default.timeline_data {
        let Some(&value) = entry.value.first() else {
            continue;
        };

        let seconds: i64 = entry
            .time
            .parse()
            .map_err(|_| ProviderError::Decode(format!("invalid timestamp '{}'", entry.time)))?;

        let timestamp = DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| ProviderError::Decode(format!("timestamp out of range: {seconds}")))?;

        if entry.is_partial {
            debug!(timestamp = %timestamp, "Including partial interval");
        }

        points.push(SeriesPoint::new(timestamp, value));
    }

    Ok(points)
}

// ============================================================================
// Static provider
// ============================================================================

/// Series given either as bare values or as timestamped points
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeriesEntry {
    Values(Vec<f64>),
    Points(Vec<SeriesPoint>),
}

/// In-memory provider for offline runs
///
/// Keywords are matched after normalization. Unknown keywords yield an empty series.
#[derive(Debug, Clone, Default)]
pub struct StaticTrendProvider {
    series: HashMap<String, Vec<SeriesPoint>>,
}

impl StaticTrendProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series of weekly samples
    #[must_use]
    pub fn with_values(mut self, keyword: &str, values: &[f64]) -> Self {
        self.insert_values(keyword, values);
        self
    }

    /// Add a series of weekly samples
    pub fn insert_values(&mut self, keyword: &str, values: &[f64]) {
        let origin = DateTime::<Utc>::default();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &value)| SeriesPoint::new(origin + chrono::Duration::weeks(i as i64), value))
            .collect();
        self.series.insert(normalize_keyword(keyword), points);
    }

    /// Add a series of timestamped points
    pub fn insert_points(&mut self, keyword: &str, points: Vec<SeriesPoint>) {
        self.series.insert(normalize_keyword(keyword), points);
    }

    /// Parse series from JSON: `{"keyword": [v0, v1, ...]}` or
    /// `{"keyword": [{"timestamp": "...", "value": 42.0}, ...]}`
    pub fn from_json_str(json: &str) -> Result<Self, ProviderError> {
        let raw: HashMap<String, SeriesEntry> =
            serde_json::from_str(json).map_err(|e| ProviderError::Decode(e.to_string()))?;

        let mut provider = Self::new();
        for (keyword, entry) in raw {
            match entry {
                SeriesEntry::Values(values) => provider.insert_values(&keyword, &values),
                SeriesEntry::Points(points) => provider.insert_points(&keyword, points),
            }
        }
        Ok(provider)
    }

    /// Load series from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Setup(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    /// Keywords with a series, sorted
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = self.series.keys().cloned().collect();
        keywords.sort();
        keywords
    }
}

#[async_trait]
impl TrendProvider for StaticTrendProvider {
    async fn interest_over_time(&self, query: &TrendQuery) -> Result<Vec<SeriesPoint>, ProviderError> {
        Ok(self
            .series
            .get(&normalize_keyword(&query.keyword))
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
