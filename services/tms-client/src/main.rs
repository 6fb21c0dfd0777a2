//! TMS client CLI
//!
//! Command-line interface for the notification watch service.

use std::path::PathBuf;

use clap::Parser;
use tms_client::{load_config, Config};
use tracing::Level;

#[derive(Parser)]
#[command(name = "tms-client")]
#[command(about = "TMS notification watch service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    tracing::info!("Starting TMS notification watch");
    tracing::debug!(
        "API endpoints: local={}, deployed={}; feed={}",
        config.api.local_url,
        config.api.deployed_url,
        config.channel.url
    );

    tms_client::run(config).await?;

    Ok(())
}
