//! Wire protocol for the real-time channel.
//!
//! Daemon and agent exchange JSON text frames over a single WebSocket. The
//! frame names are the channel's event names and are part of the public
//! protocol; subscribers (dashboards, agents) key off them.

use crate::types::{Report, Snapshot};
use serde::{Deserialize, Serialize};

/// A single frame on the real-time channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WsFrame {
    /// Agent → daemon: a full or partial state report.
    SystemUpdate(Report),
    /// Daemon → subscribers: the full registry snapshot after a mutation or
    /// on attach. Subscribers replace their local view wholesale.
    Update(Snapshot),
    /// Daemon → subscribers: a machine was deleted; the agent carrying this
    /// id must stop reporting.
    StopMonitor { machine_id: String },
}

impl WsFrame {
    /// Serialize to a JSON text frame. Infallible for these types in
    /// practice; surfaces the serde error to the caller anyway.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a JSON text frame.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_monitor_frame_shape() {
        let frame = WsFrame::StopMonitor { machine_id: "m1".to_string() };
        let json: serde_json::Value =
            serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "stop_monitor");
        assert_eq!(json["data"]["machine_id"], "m1");
    }

    #[test]
    fn test_system_update_parses_sparse_payload() {
        let text = r#"{"event":"system_update","data":{"machine_id":"m1","cpu_percent":55.0}}"#;
        match WsFrame::from_json(text).unwrap() {
            WsFrame::SystemUpdate(report) => {
                assert_eq!(report.machine_id, "m1");
                assert_eq!(report.cpu_percent, Some(55.0));
                assert!(report.hostname.is_none());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
