//! Connection supervision for the agent's real-time channel.
//!
//! Disconnected → Connecting → Connected, back to Disconnected on any
//! transport drop. Reconnection backs off exponentially and never gives up
//! while the agent is running.

use crate::backoff::Backoff;
use fleet_core::config::AgentConfig;
use fleet_core::FleetError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on a single connection attempt; a hung handshake falls through to
/// the backoff path instead of stalling the loop.
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the reconnect loop and the current connection state.
pub struct Supervisor {
    config: AgentConfig,
    state: ConnectionState,
    backoff: Backoff,
}

impl Supervisor {
    pub fn new(config: AgentConfig) -> Self {
        Self { config, state: ConnectionState::Disconnected, backoff: Backoff::new() }
    }

    /// Note a transport drop; the next `connect` starts a fresh attempt.
    pub fn mark_disconnected(&mut self, reason: impl Into<String>) {
        if self.state != ConnectionState::Disconnected {
            let err = FleetError::TransportDropped { reason: reason.into() };
            info!("{err}");
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Connect, retrying with backoff until it succeeds or `running` is
    /// cleared. Returns `None` only when the agent is shutting down.
    pub async fn connect(&mut self, running: &Arc<AtomicBool>) -> Option<WsStream> {
        let url = self.config.ws_url();
        self.state = ConnectionState::Connecting;

        while running.load(Ordering::SeqCst) {
            let attempt = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await;
            match attempt {
                Ok(Ok((stream, _))) => {
                    info!(url = %url, "Connected to server");
                    self.state = ConnectionState::Connected;
                    self.backoff.reset();
                    return Some(stream);
                }
                Ok(Err(e)) => {
                    let delay = self.backoff.next_delay();
                    warn!(url = %url, error = %e,
                        "Connect failed, retrying in {:.1}s", delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                }
                Err(_) => {
                    let delay = self.backoff.next_delay();
                    warn!(url = %url, "Connect timed out, retrying in {:.1}s",
                        delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_disconnected_transitions_state() {
        let mut supervisor = Supervisor::new(AgentConfig::default());
        assert_eq!(supervisor.state, ConnectionState::Disconnected);

        supervisor.state = ConnectionState::Connected;
        supervisor.mark_disconnected("peer closed the stream");
        assert_eq!(supervisor.state, ConnectionState::Disconnected);

        // Repeated drops stay in Disconnected
        supervisor.mark_disconnected("peer closed the stream");
        assert_eq!(supervisor.state, ConnectionState::Disconnected);
    }
}
