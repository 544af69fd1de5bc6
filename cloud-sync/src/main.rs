//! cloud-sync — periodic inventory sync for registered cloud accounts
//!
//! Opens the SQLite store, registers provider gateways and runs the sweep
//! worker until Ctrl-C.

use cloud_sync::{
    BackgroundTasks, Config, DbService, GatewayRegistry, MemoryGateway, SyncOrchestrator,
    SyncSettings, SyncWorker, TaskKind,
};
use cloud_sync::db::DbOptions;
use shared::models::CloudProvider;
use std::sync::Arc;
use std::time::Duration;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenv::dotenv();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.work_dir)?;
    std::fs::create_dir_all(&config.log_dir)?;
    cloud_sync::init_logger_with_file(
        Some(&config.log_level),
        config.is_production(),
        Some(&config.log_dir),
    );

    tracing::info!(
        environment = %config.environment,
        database = %config.database_path,
        "Starting cloud-sync"
    );

    let db = DbService::with_options(
        &config.database_path,
        DbOptions {
            max_connections: config.db_max_connections,
            ..DbOptions::default()
        },
    )
    .await?;

    let gateways = build_gateways(&config);
    let mut tasks = BackgroundTasks::new();
    let orchestrator = SyncOrchestrator::new(db.pool.clone(), gateways, SyncSettings::from(&config))
        .with_shutdown(tasks.shutdown_token());

    let worker = SyncWorker::new(orchestrator, config.sync_interval(), tasks.shutdown_token());
    tasks.spawn("sync_worker", TaskKind::Periodic, worker.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    tasks.shutdown(SHUTDOWN_GRACE).await;
    db.close().await;
    tracing::info!("cloud-sync stopped");
    Ok(())
}

/// Vendor adapters are registered here. Outside development no adapter is
/// bundled, so every sync records an `UnsupportedProvider` failure.
fn build_gateways(config: &Config) -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    if config.is_development() {
        tracing::warn!("Development mode: all providers are served by the in-memory gateway");
        for provider in CloudProvider::ALL {
            let gateway = Arc::new(MemoryGateway::new(*provider));
            registry.register(*provider, gateway.factory());
        }
    }
    registry
}
