use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use atim::config::Config;
use atim::inventory::{CsvInventory, InventorySummary, LowStockAlert};
use atim::metrics;
use atim::recommend::{recommend_with_config, resolve_season, RecommendationPayload};
use atim::report::{ReportGenerator, ReportInput};
use atim::trends::{
    merge_keywords, BatchReport, GoogleTrendsProvider, StaticTrendProvider, TrendAnalyzer,
    TrendProvider,
};
use atim::utils::{title_case, truncate_text};

/// Options of the `analyze` command
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Inventory CSV; product names become the keywords
    #[arg(short, long)]
    pub inventory: Option<PathBuf>,

    /// Extra keyword to analyze (repeatable); added after the inventory keywords
    #[arg(short, long)]
    pub keyword: Vec<String>,

    /// Read trend series from a JSON file instead of the live provider
    #[arg(long)]
    pub series_file: Option<PathBuf>,

    /// Minimum confidence for ranked trends (0-100)
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Maximum keywords analyzed in this batch
    #[arg(long)]
    pub max_keywords: Option<usize>,

    /// Region code, e.g. US; empty for worldwide
    #[arg(long)]
    pub geo: Option<String>,

    /// Provider timeframe, e.g. "today 3-m"
    #[arg(long)]
    pub timeframe: Option<String>,

    /// Directory for the HTML report
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Skip the language model and use rule-based advice
    #[arg(long, default_value = "false")]
    pub no_llm: bool,
}

pub async fn analyze(mut config: Config, args: AnalyzeArgs) -> Result<()> {
    if let Some(min_confidence) = args.min_confidence {
        config.trends.min_confidence = min_confidence;
    }
    if let Some(max_keywords) = args.max_keywords {
        config.trends.max_keywords_per_batch = max_keywords;
    }
    if let Some(geo) = &args.geo {
        config.trends.geo = geo.clone();
    }
    if let Some(timeframe) = &args.timeframe {
        config.trends.timeframe = timeframe.clone();
    }
    config.validate().context("Invalid analysis options")?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics unavailable");
    }

    let inventory = load_inventory(&config, args.inventory.as_ref())?;
    let keywords = select_keywords(&args.keyword, inventory.as_ref(), &config);
    if keywords.is_empty() {
        bail!("No keywords to analyze: pass --keyword, an inventory with products, or configure default keywords");
    }

    let provider: Arc<dyn TrendProvider> = match &args.series_file {
        Some(path) => Arc::new(
            StaticTrendProvider::from_json_file(path)
                .with_context(|| format!("Failed to load series file: {}", path.display()))?,
        ),
        None => Arc::new(GoogleTrendsProvider::new(&config.fetch).context("Failed to create trends client")?),
    };

    let analyzer = TrendAnalyzer::from_config(provider, &config)?;

    println!("Analyzing {} keywords...", keywords.len());
    println!("================================");

    let report = analyzer
        .analyze(
            &keywords,
            &config.trends.timeframe,
            &config.trends.geo,
            config.trends.min_confidence,
        )
        .await?;

    let summary = inventory.as_ref().map(CsvInventory::summary);
    if let Some(summary) = &summary {
        print_summary(summary);
    }
    print_trends(&report, config.trends.min_confidence);
    print_skipped(&report);

    let season = resolve_season(config.recommendation.season.as_deref(), Local::now().date_naive());
    let lookup = inventory.clone().unwrap_or_default();
    let payload = RecommendationPayload::assemble(
        &report.records,
        &lookup,
        season.as_str(),
        &config.recommendation.holidays,
    );

    let recommendation = if payload.is_empty() {
        println!("\nNo ranked trends; skipping recommendations.");
        None
    } else {
        let use_llm = config.recommendation.use_llm && !args.no_llm;
        let rec = recommend_with_config(&config.llm, use_llm, &payload).await;
        println!("\nRecommendations ({})", rec.source);
        println!("--------------------------------");
        println!("{}", rec.text);
        Some(rec)
    };

    let low_stock = inventory.as_ref().map(CsvInventory::low_stock).unwrap_or_default();
    print_low_stock(&low_stock);

    let input = ReportInput {
        batch: &report,
        summary: summary.as_ref(),
        low_stock: &low_stock,
        recommendation: recommendation.as_ref(),
        season: &season,
        generated_at: Local::now(),
    };
    let output_dir = args
        .report_dir
        .clone()
        .unwrap_or_else(|| config.report.output_dir.clone());
    let path = ReportGenerator::new()?.save(&input, &output_dir)?;
    println!("\nReport saved to {}", path.display());

    Ok(())
}

/// Load the inventory named on the command line, or the configured one when present
fn load_inventory(config: &Config, explicit: Option<&PathBuf>) -> Result<Option<CsvInventory>> {
    if let Some(path) = explicit {
        let inventory = CsvInventory::load(path)
            .with_context(|| format!("Failed to load inventory: {}", path.display()))?;
        return Ok(Some(inventory));
    }

    let path = &config.inventory.csv_path;
    if !path.exists() {
        tracing::warn!(path = %path.display(), "No inventory file; using default keywords");
        return Ok(None);
    }

    let inventory = CsvInventory::load(path)
        .with_context(|| format!("Failed to load inventory: {}", path.display()))?;
    Ok(Some(inventory))
}

/// Inventory product names (or the configured defaults) followed by extra keywords
fn select_keywords(extra: &[String], inventory: Option<&CsvInventory>, config: &Config) -> Vec<String> {
    let base = match inventory {
        Some(inventory) if !inventory.is_empty() => inventory.keywords(),
        _ => config.trends.default_keywords.clone(),
    };
    merge_keywords(&base, extra)
}

fn print_summary(summary: &InventorySummary) {
    println!("\nInventory Summary");
    println!("--------------------------------");
    println!("  Total items:      {}", summary.total_items);
    println!("  Low stock items:  {}", summary.low_stock_items);
    println!("  Inventory value:  ${:.2}", summary.total_inventory_value);
}

fn print_trends(report: &BatchReport, min_confidence: f64) {
    println!("\nTop Trends (confidence >= {min_confidence:.0})");
    println!("--------------------------------");

    if report.records.is_empty() {
        println!("  No trends met the confidence bar.");
        return;
    }

    for (i, record) in report.records.iter().take(10).enumerate() {
        println!(
            "{:>2}. {:<28} {} {:<9} confidence {:>5.1}  velocity {:+.2}",
            i + 1,
            truncate_text(&title_case(&record.keyword), 28),
            record.state.arrow(),
            record.state.as_str(),
            record.confidence,
            record.features.velocity,
        );
    }

    if report.below_threshold() > 0 {
        println!("  ({} more below the confidence bar)", report.below_threshold());
    }
    if report.truncated > 0 {
        println!("  ({} keywords over the batch limit were not analyzed)", report.truncated);
    }
}

fn print_skipped(report: &BatchReport) {
    if report.skipped.is_empty() {
        return;
    }

    println!("\nSkipped Keywords ({})", report.skipped_count());
    println!("--------------------------------");
    for skipped in &report.skipped {
        println!("  {:<28} {}", skipped.keyword, skipped.reason);
    }
}

fn print_low_stock(alerts: &[LowStockAlert]) {
    if alerts.is_empty() {
        return;
    }

    println!("\nLow Stock Alerts");
    println!("--------------------------------");
    for alert in alerts {
        println!(
            "  [{}] {}: {} left (reorder at {})",
            alert.urgency.as_str(),
            alert.item.product_name,
            alert.item.current_stock,
            alert.item.reorder_point,
        );
    }
}
