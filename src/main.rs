//! gracehold: serve HTTP until interrupted, then shut down gracefully.
//!
//! This is the application entry point. It loads configuration from a TOML
//! file, initializes tracing, builds the router and runs the server until
//! Ctrl+C/SIGTERM or a fatal error.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gracehold::config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use gracehold::routes::create_router;

/// gracehold: HTTP service with graceful shutdown
#[derive(Parser, Debug)]
#[command(name = "gracehold", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "gracehold=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Listen address, overriding server.address (e.g. "0.0.0.0:5050" or "unix:/run/gracehold.sock")
    #[arg(short, long)]
    address: Option<String>,
}

fn init_tracing(log_filter: &str, logging: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(log_filter));

    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration first so the log format is known
    let mut config = AppConfig::load(&args.config)?;
    if let Some(address) = args.address {
        config.server.address = address;
    }

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    init_tracing(&log_filter, &config.logging);

    tracing::info!(
        config = %args.config,
        address = %config.server.address,
        grace_ms = config.server.shutdown_grace_ms,
        "Loaded configuration"
    );

    let app = create_router();

    if let Err(e) = gracehold::run(app, &config.server).await {
        tracing::error!(error = %e, "HTTP server failed");
        return Err(e.into());
    }

    tracing::info!("Server stopped");
    Ok(())
}
