//! Real-time channel: WebSocket attach, inbound reports, event fan-out.

use crate::api::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use fleet_core::broadcast::FanoutEvent;
use fleet_core::protocol::WsFrame;
use fleet_core::FleetError;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// One task per subscriber. Forwards every hub event to the socket and
/// feeds inbound `system_update` frames into the registry. Delivery is
/// best-effort: a send failure just ends the connection.
async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    info!("Subscriber attached");
    let mut subscriber = state.registry.hub().subscribe();
    let (mut sender, mut receiver) = socket.split();

    // Subscribed above, so every subscriber (this one included) now gets
    // the current snapshot, same as after any mutation.
    state.registry.refresh().await;

    loop {
        tokio::select! {
            event = subscriber.recv() => {
                let Some(event) = event else { break };
                let frame = match event {
                    FanoutEvent::Update(snapshot) => WsFrame::Update((*snapshot).clone()),
                    FanoutEvent::StopMonitor { machine_id } => {
                        WsFrame::StopMonitor { machine_id }
                    }
                };
                let Ok(text) = frame.to_json() else { continue };
                if sender.send(Message::Text(text)).await.is_err() {
                    debug!("Subscriber send failed, dropping connection");
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_frame(&state, &text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore Ping/Pong/Binary
                    Some(Err(e)) => {
                        debug!(error = %e, "Subscriber read error");
                        break;
                    }
                }
            }
        }
    }

    info!("Subscriber detached");
}

async fn handle_frame(state: &Arc<AppState>, text: &str) {
    match WsFrame::from_json(text) {
        Ok(WsFrame::SystemUpdate(report)) => {
            match state.registry.apply_report(&report).await {
                Ok(_) => {}
                Err(FleetError::UnknownMachine { machine_id }) => {
                    warn!(machine_id = %machine_id,
                        "Partial report for unknown machine rejected");
                }
                Err(FleetError::MalformedReport { reason }) => {
                    debug!(reason = %reason, "Malformed report dropped");
                }
                Err(e) => warn!(error = %e, "Report not applied"),
            }
        }
        // Subscribers never send these; drop quietly
        Ok(_) => debug!("Ignoring unexpected inbound frame"),
        Err(e) => debug!(error = %e, "Undecodable frame dropped"),
    }
}
