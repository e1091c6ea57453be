//! ping-server entry point.
//!
//! Initializes tracing, loads configuration from defaults, an optional TOML
//! file and the environment, starts the main HTTPS application and the health
//! sub-application, then serves until SIGTERM/SIGINT.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ping_server::config::{AppConfig, DEFAULT_LOG_FILTER, DEFAULT_LOG_FORMAT};

/// ping-server: HTTPS ping service with a plain-HTTP health port
#[derive(Parser, Debug)]
#[command(name = "ping-server", version, about)]
struct Args {
    /// Path to an optional TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level filter (e.g., "ping_server=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref());

    let log_format = match &config {
        Ok(config) => config.logging.format.as_str(),
        Err(_) => DEFAULT_LOG_FORMAT,
    };
    init_tracing(args.log_level, log_format);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start the application.");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        port = config.rest.port,
        host = config.rest.bind_host(),
        protocol = %config.rest.protocol,
        health_port = ?config.health.port,
        "Loaded configuration"
    );

    let mut started = match ping_server::start(config).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start the application.");
            return ExitCode::FAILURE;
        }
    };

    match started.run_until_shutdown().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Application stopped with an error");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing with priority: CLI > env > default.
fn init_tracing(log_level: Option<String>, format: &str) {
    let log_filter = log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let fmt_layer = match format {
        "json" => tracing_subscriber::fmt::layer().json().boxed(),
        _ => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(fmt_layer)
        .init();
}
