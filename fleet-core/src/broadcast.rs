//! Fan-out hub for registry events.
//!
//! Provides the best-effort publish path from the registry to all live
//! subscribers. Delivery is at-least-once per logical event with no
//! per-subscriber acknowledgment or backpressure; a subscriber that lags
//! behind the channel buffer simply skips ahead.

use crate::types::Snapshot;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of events buffered in the broadcast channel.
const EVENT_BUFFER_SIZE: usize = 256;

/// An event fanned out to all attached subscribers.
#[derive(Debug, Clone)]
pub enum FanoutEvent {
    /// The full registry snapshot after an accepted mutation or an explicit
    /// refresh. Shared behind an Arc so fan-out does not copy the map per
    /// subscriber.
    Update(Arc<Snapshot>),
    /// A machine was deleted; the agent with this id must stop reporting.
    StopMonitor { machine_id: String },
}

/// Hub for publishing registry events to all subscribers.
#[derive(Clone)]
pub struct FanoutHub {
    sender: broadcast::Sender<FanoutEvent>,
}

impl FanoutHub {
    /// Create a new hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    /// Publish a snapshot to all subscribers.
    pub fn publish_snapshot(&self, snapshot: Snapshot) {
        debug!(records = snapshot.len(), "Publishing snapshot");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(FanoutEvent::Update(Arc::new(snapshot)));
    }

    /// Publish a stop directive for a deleted machine.
    pub fn publish_stop(&self, machine_id: &str) {
        debug!(machine_id = %machine_id, "Publishing stop directive");
        let _ = self
            .sender
            .send(FanoutEvent::StopMonitor { machine_id: machine_id.to_string() });
    }

    /// Attach a new subscriber.
    pub fn subscribe(&self) -> FanoutSubscriber {
        FanoutSubscriber { receiver: self.sender.subscribe() }
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscriber handle.
pub struct FanoutSubscriber {
    receiver: broadcast::Receiver<FanoutEvent>,
}

impl FanoutSubscriber {
    /// Receive the next event. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<FanoutEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Subscriber lagged by {} events", n);
                    // Continue receiving; the next snapshot supersedes the
                    // skipped ones anyway
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let hub = FanoutHub::new();
        let mut subscriber = hub.subscribe();

        hub.publish_snapshot(HashMap::new());

        let event = tokio::time::timeout(Duration::from_millis(100), subscriber.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, FanoutEvent::Update(snapshot) if snapshot.is_empty()));
    }

    #[tokio::test]
    async fn test_stop_directive_carries_machine_id() {
        let hub = FanoutHub::new();
        let mut subscriber = hub.subscribe();

        hub.publish_stop("m1");

        let event = tokio::time::timeout(Duration::from_millis(100), subscriber.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, FanoutEvent::StopMonitor { machine_id } if machine_id == "m1"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_noop() {
        let hub = FanoutHub::new();
        hub.publish_snapshot(HashMap::new());
        hub.publish_stop("m1");
        assert_eq!(hub.subscriber_count(), 0);
    }
}
