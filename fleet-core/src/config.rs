//! Configuration for the daemon and the reporting agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hard floor for the agent report interval.
pub const MIN_REPORT_INTERVAL_SECS: f64 = 0.5;

/// Default agent report interval.
pub const DEFAULT_REPORT_INTERVAL_SECS: f64 = 2.0;

/// Daemon configuration, overridable through `FLEETMON_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    /// Interval for the daemon's own self-report, in seconds.
    pub local_report_interval_secs: f64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            db_path: PathBuf::from(home).join(".fleetmon").join("fleet.db"),
            local_report_interval_secs: 5.0,
        }
    }
}

impl DaemonConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("FLEETMON_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("FLEETMON_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(interval) = std::env::var("FLEETMON_LOCAL_REPORT_INTERVAL") {
            if let Ok(secs) = interval.parse::<f64>() {
                config.local_report_interval_secs = secs.max(MIN_REPORT_INTERVAL_SECS);
            }
        }
        config
    }
}

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Backend base address, e.g. `http://127.0.0.1:3000`.
    pub api_url: String,
    /// Report interval in seconds, clamped to the floor.
    pub interval_secs: f64,
}

impl AgentConfig {
    pub fn new(api_url: impl Into<String>, interval_secs: f64) -> Self {
        Self {
            api_url: api_url.into(),
            interval_secs: interval_secs.max(MIN_REPORT_INTERVAL_SECS),
        }
    }

    /// WebSocket endpoint derived from the base address.
    pub fn ws_url(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", base)
        };
        format!("{}/ws", ws_base)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:3000", DEFAULT_REPORT_INTERVAL_SECS)
    }
}
