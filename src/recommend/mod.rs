//! Recommendation collaborator
//!
//! Assembles a deterministic payload from ranked trend records, the matching
//! inventory snapshot and seasonal context, renders it into a prompt, and turns
//! it into human-readable advice.
//!
//! Two recommenders are provided:
//! - [`OllamaRecommender`] asks a local Ollama model
//! - [`RuleBasedRecommender`] derives advice from product actions without network access

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{AtimErrorTrait, ErrorCategory};
use crate::inventory::{correlate, ActionKind, InventoryItem, InventoryLookup, ProductAction};
use crate::trends::types::{TrendRecord, TrendState};
use crate::utils::retry::{Retrier, RetryPolicy, Sleeper, TokioSleeper};
use crate::utils::title_case;

/// Recommendation errors
#[derive(Debug, Error)]
pub enum RecommendError {
    /// Connection failure or timeout
    #[error("LLM request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("LLM request failed: {status} - {body}")]
    Status { status: u16, body: String },

    /// The model returned no text
    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// The response could not be parsed
    #[error("Failed to parse LLM response: {0}")]
    Decode(String),

    /// The client could not be created
    #[error("Failed to create LLM client: {0}")]
    Setup(String),
}

impl RecommendError {
    /// Whether repeating the request may help
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyResponse | Self::Decode(_) | Self::Setup(_) => false,
        }
    }
}

impl AtimErrorTrait for RecommendError {
    // Rule-based advice replaces a failed model
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Setup(_))
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Setup(_) => ErrorCategory::Config,
            _ => ErrorCategory::Llm,
        }
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Trend fields passed to the recommender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub keyword: String,
    pub state: TrendState,
    pub confidence: f64,
    pub velocity: f64,
    pub average_strength: f64,
    pub volatility: f64,
}

impl From<&TrendRecord> for TrendSummary {
    fn from(record: &TrendRecord) -> Self {
        Self {
            keyword: record.keyword.clone(),
            state: record.state,
            confidence: record.confidence,
            velocity: record.features.velocity,
            average_strength: record.features.average_strength,
            volatility: record.features.volatility,
        }
    }
}

/// Structured input of a recommendation request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationPayload {
    /// Ranked trends, in rank order
    pub trends: Vec<TrendSummary>,
    /// Inventory items matching the trends, in trend order
    pub inventory: Vec<InventoryItem>,
    /// Suggested action per matched trend
    pub actions: Vec<ProductAction>,
    pub season: String,
    pub holidays: Vec<String>,
}

impl RecommendationPayload {
    /// Assemble the payload from ranked records
    ///
    /// The result depends only on the inputs: equal inputs give equal payloads.
    pub fn assemble(
        records: &[TrendRecord],
        lookup: &dyn InventoryLookup,
        season: impl Into<String>,
        holidays: &[String],
    ) -> Self {
        let inventory = records
            .iter()
            .filter_map(|r| lookup.lookup(&r.keyword).cloned())
            .collect();

        Self {
            trends: records.iter().map(TrendSummary::from).collect(),
            inventory,
            actions: correlate(records, lookup),
            season: season.into(),
            holidays: holidays.to_vec(),
        }
    }

    /// Whether there is nothing to recommend on
    pub fn is_empty(&self) -> bool {
        self.trends.is_empty()
    }

    /// Render the prompt sent to a language model
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::from(
            "You are an inventory planning assistant for a footwear retailer.\n\
             Using the search-trend signals and stock levels below, recommend concrete actions:\n\
             which products to reorder, which to mark down, and which to reposition in the warehouse or store.\n\n",
        );

        let _ = writeln!(prompt, "## Context");
        let _ = writeln!(prompt, "- Season: {}", self.season);
        if self.holidays.is_empty() {
            let _ = writeln!(prompt, "- Upcoming events: none");
        } else {
            let _ = writeln!(prompt, "- Upcoming events: {}", self.holidays.join(", "));
        }

        let _ = writeln!(prompt, "\n## Trends (ranked by confidence)");
        if self.trends.is_empty() {
            let _ = writeln!(prompt, "No keyword met the confidence bar.");
        }
        for t in &self.trends {
            let _ = writeln!(
                prompt,
                "- {}: {} (confidence {:.1}, velocity {:+.2}, strength {:.1}, volatility {:.1})",
                title_case(&t.keyword),
                t.state,
                t.confidence,
                t.velocity,
                t.average_strength,
                t.volatility
            );
        }

        let _ = writeln!(prompt, "\n## Inventory");
        if self.inventory.is_empty() {
            let _ = writeln!(prompt, "No trending product is stocked.");
        }
        for item in &self.inventory {
            let _ = writeln!(
                prompt,
                "- {} [{}]: {} in stock, reorder point {}, unit price {:.2}, location {}",
                item.product_name,
                item.category,
                item.current_stock,
                item.reorder_point,
                item.unit_price,
                if item.warehouse_location.is_empty() { "-" } else { item.warehouse_location.as_str() }
            );
        }

        if !self.actions.is_empty() {
            let _ = writeln!(prompt, "\n## Suggested actions");
            for a in &self.actions {
                let _ = writeln!(prompt, "- {}: {} ({})", a.product_name, a.action.as_str(), a.rationale);
            }
        }

        prompt.push_str(
            "\nRespond in markdown with sections \"Reorder\", \"Markdown\" and \"Reposition\". \
             Keep each recommendation to one or two sentences and mention quantities where useful.\n",
        );
        prompt
    }
}

// ============================================================================
// Season
// ============================================================================

/// Northern-hemisphere season of a month (1-12)
pub fn season_for_month(month: u32) -> &'static str {
    match month {
        3..=5 => "Spring",
        6..=8 => "Summer",
        9..=11 => "Fall",
        _ => "Winter",
    }
}

/// Configured season, or the season of `today`
pub fn resolve_season(configured: Option<&str>, today: NaiveDate) -> String {
    configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| season_for_month(today.month()).to_string())
}

// ============================================================================
// Output cleaning
// ============================================================================

/// Strip code fences, collapse runs of blank lines and trim
pub fn clean_output(text: &str) -> String {
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    static BLANK_LINES_RE: OnceLock<Regex> = OnceLock::new();

    let fence = FENCE_RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*$\n?").expect("Invalid regex pattern")
    });
    let blank_lines = BLANK_LINES_RE
        .get_or_init(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("Invalid regex pattern"));

    let normalized = text.replace("\r\n", "\n");
    let unfenced = fence.replace_all(&normalized, "");
    let collapsed = blank_lines.replace_all(&unfenced, "\n\n");

    collapsed.trim().to_string()
}

// ============================================================================
// Recommenders
// ============================================================================

/// Produces advice text from a payload
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, payload: &RecommendationPayload) -> Result<String, RecommendError>;

    /// Short name for logs and reports
    fn name(&self) -> &'static str;
}

/// Ollama generate request
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama generate response
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// Recommender backed by an Ollama model
pub struct OllamaRecommender {
    client: Client,
    config: LlmConfig,
    retrier: Retrier,
}

impl std::fmt::Debug for OllamaRecommender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaRecommender")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OllamaRecommender {
    /// Create a recommender that retries on the tokio timer
    pub fn new(config: LlmConfig) -> Result<Self, RecommendError> {
        let policy = RetryPolicy::new(
            config.max_attempts,
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(10),
        );
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        Self::with_retrier(config, Retrier::new(policy, sleeper))
    }

    /// Create a recommender with an explicit retrier
    pub fn with_retrier(config: LlmConfig, retrier: Retrier) -> Result<Self, RecommendError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RecommendError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            config,
            retrier,
        })
    }

    /// Check if Ollama is reachable
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint.trim_end_matches('/'));
        self.client.get(&url).send().await.is_ok()
    }

    /// Generate text for a prompt, retrying transient failures
    pub async fn generate(&self, prompt: &str) -> Result<String, RecommendError> {
        self.retrier
            .run(
                |_| self.generate_once(prompt),
                RecommendError::is_retryable,
                |report| {
                    if let Some(e) = report.error {
                        warn!(attempt = report.attempt, will_retry = report.will_retry, error = %e, "LLM attempt failed");
                    }
                },
            )
            .await
            .map_err(|e| e.into_inner())
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, RecommendError> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));

        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RecommendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RecommendError::Status { status, body });
        }

        let ollama: OllamaResponse = response
            .json()
            .await
            .map_err(|e| RecommendError::Decode(e.to_string()))?;

        if !ollama.done {
            debug!("Ollama reported an unfinished generation");
        }

        let text = clean_output(&ollama.response);
        if text.is_empty() {
            return Err(RecommendError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Recommender for OllamaRecommender {
    async fn recommend(&self, payload: &RecommendationPayload) -> Result<String, RecommendError> {
        let prompt = payload.render_prompt();
        debug!(prompt_len = prompt.len(), model = %self.config.model, "Requesting recommendations");
        self.generate(&prompt).await
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

/// Offline recommender deriving advice from product actions
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedRecommender;

impl RuleBasedRecommender {
    /// Render markdown advice for a payload
    pub fn render(&self, payload: &RecommendationPayload) -> String {
        if payload.is_empty() {
            return String::from(
                "No trend met the confidence bar in this run. Keep current stock levels and re-run the analysis later.",
            );
        }

        let sections = [
            ("Reorder", vec![ActionKind::Reorder, ActionKind::IncreaseStock]),
            ("Markdown", vec![ActionKind::Markdown]),
            ("Reposition", vec![ActionKind::Reposition]),
            ("Hold", vec![ActionKind::Hold]),
        ];

        let mut out = format!("# Recommendations for {}\n", payload.season);
        for (title, kinds) in sections {
            let actions: Vec<&ProductAction> = payload
                .actions
                .iter()
                .filter(|a| kinds.contains(&a.action))
                .collect();
            if actions.is_empty() {
                continue;
            }

            let _ = write!(out, "\n## {title}\n");
            for a in actions {
                let _ = writeln!(
                    out,
                    "- **{}** ({}, confidence {:.0}): {}. {}",
                    a.product_name,
                    a.state,
                    a.confidence,
                    a.action.as_str(),
                    a.rationale
                );
            }
        }

        let untracked: Vec<String> = payload
            .trends
            .iter()
            .filter(|t| !payload.actions.iter().any(|a| a.keyword == t.keyword))
            .map(|t| format!("{} ({})", title_case(&t.keyword), t.state))
            .collect();
        if !untracked.is_empty() {
            let _ = write!(out, "\n## Not stocked\n- Consider sourcing: {}\n", untracked.join(", "));
        }

        if !payload.holidays.is_empty() {
            let _ = write!(
                out,
                "\nPlan promotions around {} for rising and peaking products.\n",
                payload.holidays.join(", ")
            );
        }

        out.trim_end().to_string()
    }
}

#[async_trait]
impl Recommender for RuleBasedRecommender {
    async fn recommend(&self, payload: &RecommendationPayload) -> Result<String, RecommendError> {
        Ok(self.render(payload))
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

/// Advice text and the recommender that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub text: String,
    pub source: &'static str,
}

/// Ask `primary` for advice, falling back to rule-based advice on failure
pub async fn recommend_with_fallback(
    primary: Option<&dyn Recommender>,
    payload: &RecommendationPayload,
) -> Recommendation {
    if let Some(recommender) = primary {
        match recommender.recommend(payload).await {
            Ok(text) => {
                info!(source = recommender.name(), "Generated recommendations");
                return Recommendation {
                    text,
                    source: recommender.name(),
                };
            }
            Err(e) => {
                warn!(source = recommender.name(), error = %e, "Recommender failed, using rule-based advice");
            }
        }
    }

    let fallback = RuleBasedRecommender;
    Recommendation {
        text: fallback.render(payload),
        source: fallback.name(),
    }
}

/// Advice from the configured model when enabled and reachable, rule-based otherwise
pub async fn recommend_with_config(
    llm: &LlmConfig,
    use_llm: bool,
    payload: &RecommendationPayload,
) -> Recommendation {
    if !use_llm {
        return recommend_with_fallback(None, payload).await;
    }

    let ollama = match OllamaRecommender::new(llm.clone()) {
        Ok(ollama) => ollama,
        Err(e) => {
            warn!(error = %e, "Failed to create LLM client");
            return recommend_with_fallback(None, payload).await;
        }
    };

    if !ollama.is_available().await {
        warn!(endpoint = %llm.endpoint, "Ollama is not reachable");
        return recommend_with_fallback(None, payload).await;
    }

    recommend_with_fallback(Some(&ollama as &dyn Recommender), payload).await
}
