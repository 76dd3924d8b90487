//! HTML report rendering with the Handlebars template engine
//!
//! A report combines one batch run, the inventory snapshot it was correlated
//! against and the recommendation text into a single self-contained HTML page.

use chrono::{DateTime, Local};
use handlebars::Handlebars;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::inventory::{InventorySummary, LowStockAlert, Urgency};
use crate::recommend::Recommendation;
use crate::trends::analyzer::BatchReport;
use crate::trends::types::TrendState;
use crate::utils::title_case;

/// Default report template
const DEFAULT_TEMPLATE: &str = include_str!("../../templates/report.hbs");

const TEMPLATE_NAME: &str = "report";

/// Number of trend rows shown in a report
pub const TOP_TRENDS: usize = 10;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to register report template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),

    #[error("Failed to render report: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("Failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a report is built from
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub batch: &'a BatchReport,
    pub summary: Option<&'a InventorySummary>,
    pub low_stock: &'a [LowStockAlert],
    pub recommendation: Option<&'a Recommendation>,
    pub season: &'a str,
    pub generated_at: DateTime<Local>,
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    total_items: usize,
    low_stock_items: usize,
    total_value: String,
}

#[derive(Debug, Serialize)]
struct TrendRow {
    rank: usize,
    keyword: String,
    state: &'static str,
    state_class: &'static str,
    arrow: &'static str,
    confidence: String,
    velocity: String,
    strength: String,
    volatility: String,
}

#[derive(Debug, Serialize)]
struct AlertRow {
    product: String,
    stock: u32,
    reorder_point: u32,
    location: String,
    urgency: &'static str,
    urgency_class: &'static str,
}

#[derive(Debug, Serialize)]
struct SkippedRow {
    keyword: String,
    reason: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct RunStats {
    requested: usize,
    analyzed: usize,
    ranked: usize,
    skipped: usize,
}

/// Template data for rendering
#[derive(Debug, Serialize)]
struct ReportTemplateData {
    generated_at: String,
    season: String,
    summary: Option<SummaryRow>,
    stats: RunStats,
    trends: Vec<TrendRow>,
    low_stock: Vec<AlertRow>,
    skipped: Vec<SkippedRow>,
    recommendation: Option<String>,
    recommendation_source: Option<&'static str>,
}

impl From<&ReportInput<'_>> for ReportTemplateData {
    fn from(input: &ReportInput<'_>) -> Self {
        let batch = input.batch;

        let trends = batch
            .records
            .iter()
            .take(TOP_TRENDS)
            .enumerate()
            .map(|(i, record)| TrendRow {
                rank: i + 1,
                keyword: title_case(&record.keyword),
                state: record.state.as_str(),
                state_class: state_class(record.state),
                arrow: record.state.arrow(),
                confidence: format!("{:.1}", record.confidence),
                velocity: format!("{:+.2}", record.features.velocity),
                strength: format!("{:.1}", record.features.average_strength),
                volatility: format!("{:.1}", record.features.volatility),
            })
            .collect();

        let low_stock = input
            .low_stock
            .iter()
            .map(|alert| AlertRow {
                product: alert.item.product_name.clone(),
                stock: alert.item.current_stock,
                reorder_point: alert.item.reorder_point,
                location: alert.item.warehouse_location.clone(),
                urgency: alert.urgency.as_str(),
                urgency_class: match alert.urgency {
                    Urgency::Urgent => "urgent",
                    Urgency::Reorder => "reorder",
                },
            })
            .collect();

        let skipped = batch
            .skipped
            .iter()
            .map(|s| SkippedRow {
                keyword: s.keyword.clone(),
                reason: s.reason.as_str(),
                detail: s.detail.clone(),
            })
            .collect();

        Self {
            generated_at: input.generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            season: input.season.to_string(),
            summary: input.summary.map(|s| SummaryRow {
                total_items: s.total_items,
                low_stock_items: s.low_stock_items,
                total_value: format!("{:.2}", s.total_inventory_value),
            }),
            stats: RunStats {
                requested: batch.requested,
                analyzed: batch.analyzed,
                ranked: batch.records.len(),
                skipped: batch.skipped_count(),
            },
            trends,
            low_stock,
            skipped,
            recommendation: input.recommendation.map(|r| r.text.clone()),
            recommendation_source: input.recommendation.map(|r| r.source),
        }
    }
}

fn state_class(state: TrendState) -> &'static str {
    match state {
        TrendState::Rising => "rising",
        TrendState::Peaking => "peaking",
        TrendState::Declining => "declining",
        TrendState::Stable => "stable",
    }
}

/// File name for a report generated at `at`
pub fn report_filename(at: &DateTime<Local>) -> String {
    format!("trend_report_{}.html", at.format("%Y%m%d_%H%M%S"))
}

/// HTML report generator
pub struct ReportGenerator<'a> {
    handlebars: Handlebars<'a>,
}

impl<'a> ReportGenerator<'a> {
    /// Create a generator with the built-in template
    pub fn new() -> Result<Self, ReportError> {
        let mut handlebars = Handlebars::new();
        handlebars
            .register_template_string(TEMPLATE_NAME, DEFAULT_TEMPLATE)
            .map_err(Box::new)?;

        Ok(Self { handlebars })
    }

    /// Create a generator with a custom template file
    pub fn with_template(template_path: &Path) -> Result<Self, ReportError> {
        let mut handlebars = Handlebars::new();
        handlebars
            .register_template_file(TEMPLATE_NAME, template_path)
            .map_err(Box::new)?;

        Ok(Self { handlebars })
    }

    /// Render a report to an HTML string
    pub fn render(&self, input: &ReportInput<'_>) -> Result<String, ReportError> {
        let data = ReportTemplateData::from(input);
        Ok(self.handlebars.render(TEMPLATE_NAME, &data)?)
    }

    /// Render and write a report into `output_dir`, returning the file path
    pub fn save(&self, input: &ReportInput<'_>, output_dir: &Path) -> Result<PathBuf, ReportError> {
        let html = self.render(input)?;

        fs::create_dir_all(output_dir).map_err(|source| ReportError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let filepath = output_dir.join(report_filename(&input.generated_at));
        fs::write(&filepath, html).map_err(|source| ReportError::Io {
            path: filepath.clone(),
            source,
        })?;

        tracing::debug!(path = %filepath.display(), trends = input.batch.records.len(), "Saved report");

        Ok(filepath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryItem;
    use crate::trends::analyzer::{SkipReason, SkippedKeyword};
    use crate::trends::types::{TrendFeatures, TrendRecord};
    use chrono::TimeZone;

    fn batch() -> BatchReport {
        BatchReport {
            records: vec![TrendRecord::new(
                TrendFeatures::new("chunky sneakers", 13.2, 31.8, 12.0),
                TrendState::Rising,
                64.4,
            )],
            skipped: vec![SkippedKeyword {
                keyword: "clogs".into(),
                reason: SkipReason::EmptySeries,
                detail: "no data".into(),
            }],
            requested: 2,
            analyzed: 1,
            truncated: 0,
        }
    }

    fn generated_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 9, 1, 8, 30, 0).single().unwrap()
    }

    #[test]
    fn test_render_contains_trends_and_alerts() {
        let batch = batch();
        let alerts = vec![LowStockAlert {
            item: InventoryItem::new("Suede Boots", 2, 20),
            urgency: Urgency::Urgent,
        }];
        let rec = Recommendation {
            text: "Reorder <chunky sneakers>".into(),
            source: "rules",
        };
        let input = ReportInput {
            batch: &batch,
            summary: None,
            low_stock: &alerts,
            recommendation: Some(&rec),
            season: "Fall",
            generated_at: generated_at(),
        };

        let html = ReportGenerator::new().unwrap().render(&input).unwrap();
        assert!(html.contains("Chunky Sneakers"));
        assert!(html.contains("64.4"));
        assert!(html.contains("+13.20"));
        assert!(html.contains("Suede Boots"));
        assert!(html.contains("URGENT"));
        assert!(html.contains("clogs"));
        assert!(html.contains("&lt;chunky sneakers&gt;"));
        assert!(!html.contains("Inventory Summary"));
    }

    #[test]
    fn test_save_writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let batch = BatchReport::default();
        let input = ReportInput {
            batch: &batch,
            summary: None,
            low_stock: &[],
            recommendation: None,
            season: "Fall",
            generated_at: generated_at(),
        };

        let path = ReportGenerator::new().unwrap().save(&input, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "trend_report_20260901_083000.html");
        let html = fs::read_to_string(path).unwrap();
        assert!(html.contains("No trends met the confidence bar"));
    }
}
