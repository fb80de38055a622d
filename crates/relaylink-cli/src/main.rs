//! relaylink CLI entry point

use clap::Parser;
use tracing::{error, info};

use relaylink_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Configuration comes first so the file can turn on verbose logging
    let config = match &cli.config {
        Some(config_path) => AppConfig::load_from_file(config_path)?,
        None => AppConfig::default(),
    };

    setup_logging(cli.verbose || config.logging.verbose);
    match &cli.config {
        Some(config_path) => info!("Loaded configuration from: {}", config_path),
        None => info!("Using default configuration"),
    }

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
