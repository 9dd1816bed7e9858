//! Simulation binary for the telco tower network.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `telco-config.yaml` (or `TELCO_CONFIG`)
//! 3. Connect the CDR stream, spawn towers, start callers
//! 4. Run until the configured duration elapses or Ctrl-C
//! 5. Stop callers, stop towers, flush the stream
//! 6. Log the summary

mod caller;
mod config;
mod error;
mod universe;

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::universe::Universe;

const DEFAULT_CONFIG_PATH: &str = "telco-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration loading, stream setup, or tower
/// construction fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("telco-engine starting");

    let config = load_config()?;
    info!(
        seed = ?config.world.seed,
        towers = config.towers.count,
        callers = config.callers.count,
        nats_url = ?config.stream.nats_url,
        duration_secs = config.simulation.duration_secs,
        "Configuration loaded"
    );

    let universe = Universe::build(&config).await?;
    info!("Simulation running");

    wait_for_end(config.simulation.duration_secs).await?;

    info!("Shutting down");
    let summary = universe.shutdown().await;
    info!(
        towers = summary.towers,
        callers = summary.callers,
        attempts = summary.calls.attempts,
        connected = summary.calls.connected,
        rejected = summary.calls.rejected,
        unanswered = summary.calls.unanswered,
        completed = summary.calls.completed,
        abandoned = summary.calls.abandoned,
        no_coverage = summary.calls.no_coverage,
        flushed = summary.flushed,
        "telco-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `TELCO_CONFIG`, falling back to
/// `telco-config.yaml` in the working directory.
///
/// A missing file means defaults.
fn load_config() -> Result<SimulationConfig, EngineError> {
    let config_path = std::env::var_os("TELCO_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if config_path.exists() {
        Ok(SimulationConfig::from_file(&config_path)?)
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        Ok(SimulationConfig::parse("{}")?)
    }
}

/// Block until the run duration elapses or Ctrl-C arrives. A zero
/// duration waits for Ctrl-C only.
async fn wait_for_end(duration_secs: u64) -> Result<(), EngineError> {
    if duration_secs == 0 {
        tokio::signal::ctrl_c().await?;
        info!("Ctrl-C received");
        return Ok(());
    }
    tokio::select! {
        () = tokio::time::sleep(Duration::from_secs(duration_secs)) => {
            info!(duration_secs = duration_secs, "Run duration elapsed");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Ctrl-C received");
        }
    }
    Ok(())
}
