//! Inventory upload and report download
//!
//! `POST /upload` runs the whole pipeline for an uploaded CSV: inventory summary,
//! keyword derivation, trend batch, recommendations and the HTML report.
//! `GET /reports/{filename}` serves reports written by earlier uploads.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::Local;
use serde::Serialize;

use super::{error_response, trend_error_response, AppState};
use crate::inventory::{CsvInventory, InventorySummary, LowStockAlert, Urgency};
use crate::recommend::{recommend_with_config, resolve_season, RecommendationPayload};
use crate::report::{ReportGenerator, ReportInput, TOP_TRENDS};
use crate::trends::analyzer::SkippedKeyword;
use crate::trends::types::TrendRecord;

/// Response of `POST /upload`
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub inventory_summary: InventorySummary,
    /// Top ranked trends
    pub trending_products: Vec<TrendRecord>,
    pub skipped: Vec<SkippedKeyword>,
    pub recommendations: String,
    pub recommendation_source: String,
    pub low_stock_count: usize,
    pub low_stock_items: Vec<LowStockEntry>,
    /// Where the HTML report can be fetched
    pub report_url: String,
}

/// Low-stock item as listed in the upload response
#[derive(Debug, Serialize)]
pub struct LowStockEntry {
    pub product_name: String,
    pub current_stock: u32,
    pub reorder_point: u32,
    pub urgency: Urgency,
}

impl From<&LowStockAlert> for LowStockEntry {
    fn from(alert: &LowStockAlert) -> Self {
        Self {
            product_name: alert.item.product_name.clone(),
            current_stock: alert.item.current_stock,
            reorder_point: alert.item.reorder_point,
            urgency: alert.urgency,
        }
    }
}

/// Fields of the upload form
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    max_keywords: Option<usize>,
    min_confidence: Option<f64>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, Response> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(IntoResponse::into_response)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content = field.bytes().await.map_err(IntoResponse::into_response)?;
                form.file = Some((filename, content));
            }
            "max_keywords" => {
                let text = field.text().await.map_err(IntoResponse::into_response)?;
                form.max_keywords = parse_optional(&text, "max_keywords")?;
            }
            "min_confidence" => {
                let text = field.text().await.map_err(IntoResponse::into_response)?;
                form.min_confidence = parse_optional(&text, "min_confidence")?;
            }
            _ => {}
        }
    }

    Ok(form)
}

fn parse_optional<T: std::str::FromStr>(text: &str, field: &str) -> Result<Option<T>, Response> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse().map(Some).map_err(|_| {
        error_response(StatusCode::BAD_REQUEST, format!("Invalid {field} '{text}'"))
    })
}

fn is_csv(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("csv"))
}

pub(super) async fn upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let Some((filename, content)) = form.file else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided");
    };
    if filename.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No file selected");
    }
    if !is_csv(&filename) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid file type. Please upload a CSV file.");
    }

    let inventory = match CsvInventory::from_reader(content.as_ref()) {
        Ok(inventory) => inventory,
        Err(e) => {
            tracing::warn!(filename = %filename, error = %e, "Rejected inventory upload");
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let config = &state.config;
    let keywords = inventory.keywords();
    let min_confidence = form.min_confidence.unwrap_or(config.trends.min_confidence);

    tracing::info!(filename = %filename, items = inventory.len(), "Processing inventory upload");

    let batch = {
        let analyzer = state.analyzer.lock().await;
        let limit = form.max_keywords.unwrap_or(analyzer.max_keywords_per_batch());
        analyzer
            .analyze_limited(&keywords, limit, &config.trends.timeframe, &config.trends.geo, min_confidence)
            .await
    };
    let batch = match batch {
        Ok(batch) => batch,
        Err(e) => return trend_error_response(e),
    };

    let season = resolve_season(config.recommendation.season.as_deref(), Local::now().date_naive());
    let payload = RecommendationPayload::assemble(
        &batch.records,
        &inventory,
        &season,
        &config.recommendation.holidays,
    );
    let use_llm = config.recommendation.use_llm && !payload.is_empty();
    let recommendation = recommend_with_config(&config.llm, use_llm, &payload).await;

    let summary = inventory.summary();
    let low_stock = inventory.low_stock();

    let input = ReportInput {
        batch: &batch,
        summary: Some(&summary),
        low_stock: &low_stock,
        recommendation: Some(&recommendation),
        season: &season,
        generated_at: Local::now(),
    };
    let saved = ReportGenerator::new().and_then(|generator| generator.save(&input, &config.report.output_dir));
    let report_name = match saved {
        Ok(path) => path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_default(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to write report");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let response = UploadResponse {
        success: true,
        inventory_summary: summary,
        trending_products: batch.records.iter().take(TOP_TRENDS).cloned().collect(),
        skipped: batch.skipped.clone(),
        recommendations: recommendation.text,
        recommendation_source: recommendation.source.to_string(),
        low_stock_count: low_stock.len(),
        low_stock_items: low_stock.iter().map(LowStockEntry::from).collect(),
        report_url: format!("/reports/{report_name}"),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Plain report file name: no separators, no leading dot, `.html` extension
fn is_report_name(name: &str) -> bool {
    !name.starts_with('.')
        && !name.contains("..")
        && name.len() > ".html".len()
        && name.ends_with(".html")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

pub(super) async fn download_report(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    if !is_report_name(&filename) {
        tracing::warn!(filename = %filename, "Rejected report name");
        return error_response(StatusCode::BAD_REQUEST, "Invalid report name");
    }

    let path = state.config.report.output_dir.join(&filename);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, format!("Report not found: {filename}"))
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read report");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read report")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_csv() {
        assert!(is_csv("inventory.csv"));
        assert!(is_csv("Stock.CSV"));
        assert!(!is_csv("inventory.xlsx"));
        assert!(!is_csv(".csv"));
        assert!(!is_csv("csv"));
    }

    #[test]
    fn test_is_report_name() {
        assert!(is_report_name("trend_report_20261018_090500.html"));
        assert!(!is_report_name("../config.toml"));
        assert!(!is_report_name("..html"));
        assert!(!is_report_name(".html"));
        assert!(!is_report_name("nested/report.html"));
        assert!(!is_report_name("report.txt"));
    }
}
