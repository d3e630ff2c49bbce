use fleet_core::config::DaemonConfig;
use fleet_core::{DeviceStore, FanoutHub, Registry};
use fleet_daemon::{api, reporter};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize observability FIRST
    fleet_core::init_observability()?;

    info!("fleetmond starting");

    let config = DaemonConfig::from_env();

    // An unreachable store must not keep the daemon down: serve from memory
    // and let the next restart with a healthy store recover durably.
    let store = match DeviceStore::new(&config.db_path).await {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Durable store unavailable, serving from memory only");
            DeviceStore::new_in_memory().await?
        }
    };

    let registry = Arc::new(Registry::new(store, FanoutHub::new()));
    registry.warm_load().await;

    let reporter_handle = tokio::spawn(reporter::run_local_reporter(
        registry.clone(),
        config.local_report_interval_secs,
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Serving on {}", config.bind_addr);

    let app = api::build_router(registry);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "API server exited");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    reporter_handle.abort();
    server_handle.abort();
    let _ = server_handle.await;

    info!("fleetmond shutting down");
    Ok(())
}
