//! Data types for the fleet registry and its wire format.
//!
//! Keep this module minimal and stable. It defines both the canonical
//! in-memory record and the report payload agents send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Usage of one mounted volume, in GiB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount: String,
    pub used: f64,
    pub total: f64,
    pub percent: f64,
}

/// Canonical state of one monitored machine.
///
/// Exactly one record exists per `machine_id` at any time. Static fields are
/// set by full reports; dynamic fields are refreshed by every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable opaque identifier, never regenerated once assigned.
    pub machine_id: String,

    // Static identity
    pub hostname: String,
    pub os: String,
    pub ip: String,
    pub cpu_count: u32,
    /// Free-form deployment tag, `"-"` when the agent reports none.
    #[serde(default = "default_platform")]
    pub platform: String,

    // Dynamic metrics
    pub cpu_percent: f64,
    pub ram_used: f64,
    pub ram_total: f64,
    pub ram_percent: f64,
    pub disk_used: f64,
    pub disk_total: f64,
    pub disk_percent: f64,
    #[serde(default)]
    pub disks: Vec<DiskUsage>,

    pub last_update: DateTime<Utc>,
}

pub(crate) fn default_platform() -> String {
    "-".to_string()
}

impl DeviceRecord {
    /// Baseline record for a machine the registry has never seen. All
    /// metrics zeroed, platform defaulted; callers merge report fields on
    /// top of this.
    pub fn unregistered(machine_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            hostname: String::new(),
            os: String::new(),
            ip: String::new(),
            cpu_count: 0,
            platform: default_platform(),
            cpu_percent: 0.0,
            ram_used: 0.0,
            ram_total: 0.0,
            ram_percent: 0.0,
            disk_used: 0.0,
            disk_total: 0.0,
            disk_percent: 0.0,
            disks: Vec::new(),
            last_update: now,
        }
    }
}

/// Point-in-time immutable copy of the full registry, keyed by machine id.
pub type Snapshot = HashMap<String, DeviceRecord>;

/// An incoming state report for one machine.
///
/// Every field except `machine_id` is optional; the reconciliation engine
/// overwrites exactly the fields that are present and preserves the rest.
/// Omission and null are equivalent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Defaults to empty when the payload omits it; the reconciliation
    /// engine rejects empty ids, and the request-style endpoints fill it
    /// from the path parameter.
    #[serde(default)]
    pub machine_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disks: Option<Vec<DiskUsage>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl Report {
    /// A report is full when it carries the static identity set in addition
    /// to whatever dynamic fields it has; otherwise it is partial.
    pub fn is_full(&self) -> bool {
        self.hostname.is_some()
            && self.os.is_some()
            && self.ip.is_some()
            && self.cpu_count.is_some()
    }
}
