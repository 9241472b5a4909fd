//! # Wallet Engine
//!
//! Runs an engine against the local in-memory chain until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry
//! 2. Load configuration from the environment
//! 3. Build the engine through the process-wide host
//! 4. Wait for shutdown, then destroy the engine

use anyhow::{Context, Result};
use tracing::info;

use wallet_engine::{engine, EngineConfig, EngineServices, InitialState};
use wallet_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env()).context("telemetry init")?;

    let config = EngineConfig::from_env();
    let services = EngineServices::local(&config);

    let host = engine();
    let live = host
        .init(config, services, InitialState::default(), None)
        .await
        .context("engine init")?;
    info!(chain = %live.context().network.current_chain_id(), "Wallet engine is running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    host.destroy_engine().await;
    Ok(())
}
