//! HTTP server
//!
//! Exposes batch analysis over a small REST surface:
//!
//! - `GET /health` - liveness and version
//! - `POST /api/analyze` - run one batch and return the [`BatchReport`]
//! - `POST /upload` - analyze an uploaded inventory CSV and write an HTML report
//! - `GET /reports/{filename}` - serve a written report
//! - `GET /metrics` - Prometheus text exposition
//!
//! Analyses are serialised through an async mutex because every batch shares
//! the same upstream rate limit.

mod upload;

pub use upload::{LowStockEntry, UploadResponse};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, ServerConfig};
use crate::metrics;
use crate::trends::analyzer::{BatchReport, TrendAnalyzer};
use crate::trends::error::TrendError;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Batch analyzer, one batch at a time
    pub analyzer: Arc<Mutex<TrendAnalyzer>>,

    /// Defaults for request fields
    pub config: Arc<Config>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(analyzer: TrendAnalyzer, config: Config) -> Self {
        Self {
            analyzer: Arc::new(Mutex::new(analyzer)),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
}

/// Simple error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Body of `POST /api/analyze`; omitted fields fall back to configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub max_keywords: Option<usize>,
    #[serde(default)]
    pub geo: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
}

// ============================================================================
// Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.server.max_upload_bytes);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/analyze", post(analyze))
        .route("/upload", post(upload::upload).layer(upload_limit))
        .route("/reports/{filename}", get(upload::download_report))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// 400 for rejected parameters, 500 otherwise
fn trend_error_response(error: TrendError) -> Response {
    match error {
        TrendError::InvalidConfiguration(_) => {
            tracing::warn!(error = %error, "Rejected analysis parameters");
            error_response(StatusCode::BAD_REQUEST, error.to_string())
        }
        _ => {
            tracing::error!(error = %error, "Batch analysis failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn analyze(State(state): State<AppState>, Json(request): Json<AnalyzeRequest>) -> Response {
    let trends = &state.config.trends;
    let min_confidence = request.min_confidence.unwrap_or(trends.min_confidence);
    let geo = request.geo.as_deref().unwrap_or(&trends.geo);
    let timeframe = request.timeframe.as_deref().unwrap_or(&trends.timeframe);

    let analyzer = state.analyzer.lock().await;
    let limit = request.max_keywords.unwrap_or(analyzer.max_keywords_per_batch());

    tracing::info!(keywords = request.keywords.len(), limit, geo, timeframe, "Analyze request");

    let result: Result<BatchReport, TrendError> = analyzer
        .analyze_limited(&request.keywords, limit, timeframe, geo, min_confidence)
        .await;

    match result {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => trend_error_response(e),
    }
}

async fn metrics_text() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Server
// ============================================================================

/// Analysis HTTP server
pub struct TrendServer {
    config: ServerConfig,
    state: AppState,
}

impl TrendServer {
    pub fn new(analyzer: TrendAnalyzer, config: Config) -> Self {
        Self {
            config: config.server.clone(),
            state: AppState::new(analyzer, config),
        }
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.config.bind_address
    }

    /// Build the router with all routes and layers
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        tracing::info!(%addr, "Starting atim server");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(ServerError::Serve)?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trends::provider::StaticTrendProvider;

    fn server(enable_cors: bool) -> TrendServer {
        let mut config = Config::default();
        config.server.enable_cors = enable_cors;
        let analyzer =
            TrendAnalyzer::from_config(Arc::new(StaticTrendProvider::new()), &config).unwrap();
        TrendServer::new(analyzer, config)
    }

    #[test]
    fn test_server_uses_configured_address() {
        let server = server(true);
        assert_eq!(server.bind_address(), Config::default().server.bind_address);
    }

    #[tokio::test]
    async fn test_state_shares_analyzer() {
        let server = server(false);
        let a = server.state();
        let b = server.state();
        assert!(Arc::ptr_eq(&a.analyzer, &b.analyzer));
        assert_eq!(a.analyzer.lock().await.max_keywords_per_batch(), 15);
    }

    #[test]
    fn test_analyze_request_defaults() {
        let request: AnalyzeRequest = serde_json::from_str(r#"{"keywords": ["boots"]}"#).unwrap();
        assert_eq!(request.keywords, vec!["boots"]);
        assert!(request.min_confidence.is_none());
        assert!(request.geo.is_none());
    }
}
