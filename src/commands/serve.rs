use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use atim::config::Config;
use atim::metrics;
use atim::server::TrendServer;
use atim::trends::{GoogleTrendsProvider, StaticTrendProvider, TrendAnalyzer, TrendProvider};

pub async fn serve(mut config: Config, bind: Option<SocketAddr>, series_file: Option<PathBuf>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics unavailable");
    }

    let provider: Arc<dyn TrendProvider> = match &series_file {
        Some(path) => Arc::new(
            StaticTrendProvider::from_json_file(path)
                .with_context(|| format!("Failed to load series file: {}", path.display()))?,
        ),
        None => Arc::new(GoogleTrendsProvider::new(&config.fetch).context("Failed to create trends client")?),
    };

    let analyzer = TrendAnalyzer::from_config(provider, &config)?;
    let server = TrendServer::new(analyzer, config);

    println!("atim server listening on http://{}", server.bind_address());
    println!("  GET  /health");
    println!("  POST /api/analyze");
    println!("  POST /upload");
    println!("  GET  /reports/{{filename}}");
    println!("  GET  /metrics");

    server
        .start_with_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
