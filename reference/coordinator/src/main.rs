//! Omnisweep Coordinator Binary
//!
//! Runs a single origin coordinator wired to the in-memory collaborators,
//! with the deadline watch active, until Ctrl+C.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omnisweep_common::SystemClock;
use omnisweep_coordinator::{Collaborators, CoordinatorConfig, SweepCoordinator};
use omnisweep_protocol::memory::{
    MemoryBridgeHub, MemoryNetwork, MemoryVault, RecordingPrivacyHook, StaticRateVenue,
};
use omnisweep_protocol::{BridgeEndpoint, BridgeFlavor, BridgeRouter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting omnisweep coordinator");

    // Load configuration
    let config = match std::env::var("OMNISWEEP_CONFIG") {
        Ok(path) => CoordinatorConfig::from_json_file(&path)
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?,
        Err(_) => CoordinatorConfig::from_env(),
    };
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let network = Arc::new(MemoryNetwork::free());
    let vault = Arc::new(MemoryVault::new(config.coordinator_address));
    let hub = Arc::new(MemoryBridgeHub::new());
    let endpoint = match config.bridge.flavor_for(config.self_domain) {
        Some(BridgeFlavor::LegacyFixedPair) => {
            BridgeEndpoint::Legacy(hub.legacy_endpoint(vault.clone()))
        }
        _ => BridgeEndpoint::Generic(hub.generic_endpoint(vault.clone())),
    };
    let bridge = BridgeRouter::new(config.self_domain, config.bridge.clone(), endpoint)?;

    let coordinator = Arc::new(SweepCoordinator::new(
        config.clone(),
        Collaborators {
            transport: Arc::new(network.endpoint(config.self_domain, config.coordinator_address)),
            adapter: Arc::new(StaticRateVenue::new(vault.clone())),
            bridge: Arc::new(bridge),
            custody: vault.clone(),
            privacy: Arc::new(RecordingPrivacyHook::new(vault)),
            clock: Arc::new(SystemClock),
        },
    )?);
    network.register_handler(config.self_domain, &coordinator);

    let watch = coordinator.spawn_deadline_watch();

    info!(
        domain = %config.self_domain,
        remotes = config.remotes.len(),
        counting_mode = ?config.counting_mode,
        "Coordinator running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
    info!("Shutdown signal received");

    coordinator.stop().await;
    if let Err(e) = watch.await {
        error!(error = %e, "Deadline watch ended abnormally");
    }

    info!(metrics = %coordinator.metrics().to_prometheus(), "Coordinator shutdown complete");
    Ok(())
}
