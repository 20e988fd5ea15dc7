//! Headless tracker entrypoint.
//!
//! Loads the config file, starts the sampling loop, and runs until
//! interrupted. Host power/lock integration is up to the embedding
//! platform layer; this binary only wires shutdown.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use timetracker::config::{self, TrackerConfig};
use timetracker::Tracker;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = match config::default_config_path() {
        Some(path) => config::load_config(&path).context("invalid configuration")?,
        None => {
            warn!("Could not resolve a config directory, using defaults");
            TrackerConfig::default()
        }
    };
    if config.resolved_api_key().is_empty() {
        warn!("No API key configured; screenshots will be captured but never analyzed");
    }

    let tracker = Tracker::new(config, config::default_output_dir())
        .context("failed to initialize tracker")?;
    info!(
        "Tracking to {} (log: {})",
        tracker.output_dir().display(),
        tracker.activity_log_path().display()
    );

    tracker.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    tracker.stop();
    Ok(())
}
