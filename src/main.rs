//! Lookout daemon
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - LOOKOUT_HOST: Status server bind address (default: 0.0.0.0)
//! - LOOKOUT_PORT: Status server port (default: 8080)
//! - LOOKOUT_CHECKS_FILE: Check definitions (default: checks.json)
//! - LOOKOUT_INTERVAL_SECS: Seconds between cycles (default: 60)
//! - LOOKOUT_MAX_WINDOW_SECS: Ceiling for failure windows (default: 3600)
//! - LOOKOUT_CYCLE_TIMEOUT_SECS: Wait for slow probes per cycle (default: 30)
//! - LOOKOUT_TELEMETRY_PATH: Append telemetry as JSON lines (default: unset)
//! - RUST_LOG: Log level (default: info)

use std::path::PathBuf;

use lookout::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lookout=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        host: std::env::var("LOOKOUT_HOST").unwrap_or(defaults.host),
        port: env_or("LOOKOUT_PORT", defaults.port),
        checks_file: std::env::var("LOOKOUT_CHECKS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.checks_file),
        interval_secs: env_or("LOOKOUT_INTERVAL_SECS", defaults.interval_secs).max(1),
        max_window_secs: env_or("LOOKOUT_MAX_WINDOW_SECS", defaults.max_window_secs),
        cycle_timeout_secs: env_or("LOOKOUT_CYCLE_TIMEOUT_SECS", defaults.cycle_timeout_secs)
            .max(1),
        telemetry_path: std::env::var("LOOKOUT_TELEMETRY_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from),
    };

    tracing::info!("Lookout configuration:");
    tracing::info!("  Status server: {}:{}", config.host, config.port);
    tracing::info!("  Checks file: {}", config.checks_file.display());
    tracing::info!("  Cycle interval: {} seconds", config.interval_secs);
    tracing::info!("  Max failure window: {} seconds", config.max_window_secs);
    tracing::info!("  Cycle timeout: {} seconds", config.cycle_timeout_secs);
    match &config.telemetry_path {
        Some(path) => tracing::info!("  Telemetry: {}", path.display()),
        None => tracing::info!("  Telemetry: in memory only"),
    }

    run_server(config).await
}
