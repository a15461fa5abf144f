//! # Tracking Service
//!
//! Process entry point. Startup proceeds in this order:
//!
//! 1. Load `.env` (if present) and initialize tracing from `RUST_LOG`.
//! 2. Read [`ServiceConfig`] from the environment.
//! 3. Start the [`TrackingSystem`]: trust configuration first, then every component
//!    concurrently. The process serves only if all of them came up.
//! 4. Run until Ctrl-C, then shut down gracefully.
//!
//! A failed startup is logged with its cause and the process exits with an error.

use deploy_framework::tracing::setup_tracing;
use tracing::{error, info};
use tracking_service::config::ServiceConfig;
use tracking_service::lifecycle::TrackingSystem;

#[tokio::main]
async fn main() -> Result<(), String> {
    let _ = dotenvy::dotenv();
    setup_tracing();

    let config = ServiceConfig::from_env().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e.to_string()
    })?;

    let system = TrackingSystem::start(config).await.map_err(|e| {
        error!(
            error = %e,
            failed = ?e.failed_components(),
            "Tracking service failed to start"
        );
        e.to_string()
    })?;

    info!("Tracking service started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    system.shutdown().await.map_err(|e| e.to_string())?;

    info!("Tracking service stopped");
    Ok(())
}
