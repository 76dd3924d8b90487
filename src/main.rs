use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atim::config::Config;

mod commands;

use commands::{analyze, inventory, serve, AnalyzeArgs};

#[derive(Parser)]
#[command(
    name = "atim",
    version,
    about = "Automated trend & inventory manager: search-trend classification with restocking advice",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze keyword trends and recommend inventory actions
    Analyze(AnalyzeArgs),

    /// Show inventory summary and low-stock alerts
    Inventory {
        /// Inventory CSV file
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Start the HTTP analysis server
    Serve {
        /// Address to bind, e.g. 127.0.0.1:5000
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Serve trend series from a JSON file instead of the live provider
        #[arg(long)]
        series_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    tracing::info!(config = ?cli.config, "atim starting");

    match cli.command {
        Commands::Analyze(args) => {
            tracing::info!(
                keywords = args.keyword.len(),
                inventory = ?args.inventory,
                series_file = ?args.series_file,
                no_llm = args.no_llm,
                "Starting analyze command"
            );
            analyze(config, args).await?;
        }

        Commands::Inventory { path } => {
            tracing::info!(path = ?path, "Starting inventory command");
            inventory(config, path)?;
        }

        Commands::Serve { bind, series_file } => {
            tracing::info!(bind = ?bind, series_file = ?series_file, "Starting serve command");
            serve(config, bind, series_file).await?;
        }
    }

    tracing::info!("atim completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("atim=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("atim={level},warn"))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
