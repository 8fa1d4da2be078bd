//! CamDeck GW - Rust implementation
//!
//! Gateway bridging a button/dial control deck to a smartphone webcam
//! server over its local HTTP API.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camdeck_gw::cli;
use camdeck_gw::config::AppConfig;
use camdeck_gw::paths;
use camdeck_gw::router::Router;
use camdeck_gw::settings::SettingsStore;

/// CamDeck Gateway - drive a smartphone webcam from a control deck
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List supported action kinds
    #[arg(long)]
    list_actions: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    if args.list_actions {
        cli::list_actions_formatted();
        return Ok(());
    }

    info!("Starting CamDeck GW...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load_or_default(&args.config).await?;

    let db_path = paths::settings_db_path(&config);
    let settings = SettingsStore::spawn(&db_path, config.storage.debounce_ms)?;

    let router = Arc::new(Router::new(&config, settings.clone()));
    info!("Router initialized");

    // The REPL is the host surface stand-in; ctrl-d/ctrl-c leaves it
    cli::run_repl(router.clone()).await?;

    info!("Shutting down...");
    router.shutdown().await;
    settings.flush().await?;
    settings.shutdown();
    info!("CamDeck GW shutdown complete");

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
