use anyhow::Result;
use clap::Parser;
use fleet_core::collect::{Collector, StaticIdentity};
use fleet_core::config::AgentConfig;
use fleet_core::protocol::WsFrame;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

mod backoff;
mod connection;

use connection::{Supervisor, WsStream};

/// Bound on the registry existence check so a slow backend degrades into
/// the normal send path instead of stalling the loop.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "fleet-agent")]
#[command(about = "Lightweight fleet monitoring agent", long_about = None)]
struct Cli {
    /// Backend API URL
    #[arg(short, long, env = "FLEETMON_API_URL", default_value = "http://127.0.0.1:3000")]
    api: String,

    /// Send interval in seconds (floor 0.5)
    #[arg(short, long, default_value_t = 2.0)]
    interval: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fleet_core::init_observability().map_err(|e| anyhow::anyhow!("{e}"))?;

    let cli = Cli::parse();
    let config = AgentConfig::new(cli.api, cli.interval);

    let identity = StaticIdentity::collect();
    info!(machine_id = %identity.machine_id, hostname = %identity.hostname,
        api = %config.api_url, "Starting fleet agent");

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping");
                running.store(false, Ordering::SeqCst);
            }
        });
    }

    let http = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
    let mut collector = Collector::new();
    let mut supervisor = Supervisor::new(config.clone());

    while running.load(Ordering::SeqCst) {
        let Some(stream) = supervisor.connect(&running).await else { break };
        let (mut write, read) = stream.split();

        let reader = tokio::spawn(watch_directives(
            read,
            identity.machine_id.clone(),
            running.clone(),
        ));

        let mut drop_reason = String::from("channel closed");
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(config.interval_secs));
        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            // Known machines only need dynamic metrics; an unknown (or
            // unreachable) registry gets the full identity payload. The
            // check-then-send window is tolerated: a partial racing a
            // delete is rejected server-side and the next tick re-registers.
            let report = if is_known(&http, &config.api_url, &identity.machine_id).await {
                collector.partial_report(&identity.machine_id)
            } else {
                collector.full_report(&identity)
            };

            let Ok(text) = WsFrame::SystemUpdate(report).to_json() else { continue };
            if let Err(e) = write.send(Message::Text(text)).await {
                warn!(error = %e, "Send failed, reconnecting");
                drop_reason = e.to_string();
                break;
            }
        }

        reader.abort();
        supervisor.mark_disconnected(drop_reason);

        if !running.load(Ordering::SeqCst) {
            let _ = write.send(Message::Close(None)).await;
        }
    }

    info!("Fleet agent stopped");
    Ok(())
}

/// Watch the channel for a stop directive naming this machine. Snapshot
/// frames are for dashboards; the agent ignores them.
async fn watch_directives(
    mut read: SplitStream<WsStream>,
    machine_id: String,
    running: Arc<AtomicBool>,
) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Ok(WsFrame::StopMonitor { machine_id: target }) =
                    WsFrame::from_json(&text)
                {
                    if target == machine_id {
                        info!("Stop directive received, shutting down");
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Point lookup: is this machine already registered? Lookup trouble counts
/// as unknown, which just costs one full payload.
async fn is_known(client: &reqwest::Client, base: &str, machine_id: &str) -> bool {
    let url = format!("{}/clients/{}", base.trim_end_matches('/'), machine_id);
    match client.get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            debug!(error = %e, "Existence check failed, sending full report");
            false
        }
    }
}
