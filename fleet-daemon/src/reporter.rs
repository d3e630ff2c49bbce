//! The daemon's own reporter: the backend host shows up in the fleet too.

use fleet_core::collect::{Collector, StaticIdentity};
use fleet_core::Registry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Periodically report the daemon host's metrics through the same registry
/// path agents use. Never returns; the caller aborts it on shutdown.
pub async fn run_local_reporter(registry: Arc<Registry>, interval_secs: f64) {
    let identity = StaticIdentity::collect();
    let mut collector = Collector::new();
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(interval_secs));

    info!(machine_id = %identity.machine_id, interval_secs,
        "Local reporter started");

    loop {
        ticker.tick().await;

        let report = if registry.contains(&identity.machine_id).await {
            collector.partial_report(&identity.machine_id)
        } else {
            collector.full_report(&identity)
        };

        if let Err(e) = registry.apply_report(&report).await {
            warn!(error = %e, "Local report not applied");
        }
    }
}
