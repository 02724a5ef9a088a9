//! # DealerSync Main Entry Point
//!
//! This is the main entry point for the DealerSync ingestion service.

use dealersync::{
    config::ConfigLoader,
    db::init_pool,
    server::{build_app_state, run_server},
    telemetry::init_tracing,
};
use migration::{Migrator, MigratorTrait};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    let state = build_app_state(config, db)?;

    // Ctrl-C starts a graceful drain of running jobs.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    run_server(state, shutdown).await
}
