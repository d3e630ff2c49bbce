//! Local machine metrics collection.
//!
//! Shared by the agent and the daemon's own reporter task. Static identity
//! is gathered once at startup; dynamic metrics are refreshed per tick.

use crate::types::{DiskUsage, Report};
use chrono::Utc;
use sysinfo::{Disks, Networks, System};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Mounts smaller than this are noise (tmpfs, loopbacks) and are excluded
/// from the per-mount disk list.
const MIN_DISK_BYTES: u64 = 1024 * 1024 * 1024;

/// Static identity of the local machine, collected once.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    pub machine_id: String,
    pub hostname: String,
    pub os: String,
    pub ip: String,
    pub cpu_count: u32,
}

impl StaticIdentity {
    /// Gather the local machine's identity.
    ///
    /// The machine id is the primary interface's MAC address in hex, which
    /// is stable across restarts; the hostname stands in when no interface
    /// reports one.
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();

        let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
        let os = format!(
            "{} {}",
            System::name().unwrap_or_else(|| "Unknown".to_string()),
            System::os_version().unwrap_or_default()
        )
        .trim()
        .to_string();

        let machine_id = primary_mac_address().unwrap_or_else(|| hostname.clone());

        Self {
            machine_id,
            hostname,
            os,
            ip: local_ip(),
            cpu_count: sys.cpus().len() as u32,
        }
    }
}

/// Rolling collector for dynamic metrics.
///
/// CPU usage needs two refreshes some time apart; the first tick after
/// construction reads near zero, which matches how the fleet has always
/// behaved.
pub struct Collector {
    sys: System,
}

impl Collector {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Self { sys }
    }

    /// A full report: identity plus current metrics.
    pub fn full_report(&mut self, identity: &StaticIdentity) -> Report {
        let mut report = self.partial_report(&identity.machine_id);
        report.hostname = Some(identity.hostname.clone());
        report.os = Some(identity.os.clone());
        report.ip = Some(identity.ip.clone());
        report.cpu_count = Some(identity.cpu_count);
        report
    }

    /// A partial report: dynamic metrics only.
    pub fn partial_report(&mut self, machine_id: &str) -> Report {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();

        let ram_total = self.sys.total_memory() as f64 / GIB;
        let ram_used = self.sys.used_memory() as f64 / GIB;
        let ram_percent = if ram_total > 0.0 { ram_used / ram_total * 100.0 } else { 0.0 };

        let (disks, disk_used, disk_total) = disk_usage();
        let disk_percent = if disk_total > 0.0 { disk_used / disk_total * 100.0 } else { 0.0 };

        Report {
            machine_id: machine_id.to_string(),
            cpu_percent: Some(self.sys.global_cpu_usage() as f64),
            ram_used: Some(ram_used),
            ram_total: Some(ram_total),
            ram_percent: Some(ram_percent),
            disk_used: Some(disk_used),
            disk_total: Some(disk_total),
            disk_percent: Some(disk_percent),
            disks: Some(disks),
            last_update: Some(Utc::now()),
            ..Default::default()
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

/// Enumerate mounted volumes of at least 1 GiB, in GiB units, plus the
/// aggregate used/total across them. Mounts the platform refuses to stat
/// simply don't show up in the refreshed list.
fn disk_usage() -> (Vec<DiskUsage>, f64, f64) {
    let mut disks = Vec::new();
    let mut total_used = 0.0;
    let mut total_size = 0.0;

    for disk in Disks::new_with_refreshed_list().iter() {
        let total = disk.total_space();
        if total < MIN_DISK_BYTES {
            continue;
        }
        let used = total.saturating_sub(disk.available_space());
        let total_gib = total as f64 / GIB;
        let used_gib = used as f64 / GIB;
        disks.push(DiskUsage {
            mount: disk.mount_point().to_string_lossy().to_string(),
            used: used_gib,
            total: total_gib,
            percent: used_gib / total_gib * 100.0,
        });
        total_used += used_gib;
        total_size += total_gib;
    }

    (disks, total_used, total_size)
}

/// MAC of the first interface that has a non-zero one, loopback excluded.
fn primary_mac_address() -> Option<String> {
    let networks = Networks::new_with_refreshed_list();
    let mut candidates: Vec<_> = networks
        .iter()
        .filter(|(name, _)| !name.starts_with("lo"))
        .collect();
    candidates.sort_by_key(|(name, _)| name.to_string());

    for (_, data) in candidates {
        let mac = data.mac_address().to_string();
        if mac != "00:00:00:00:00:00" {
            return Some(mac.replace(':', ""));
        }
    }
    None
}

/// Routing-table-resolved local address; no packet is actually sent.
fn local_ip() -> String {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_identity_is_populated() {
        let identity = StaticIdentity::collect();
        assert!(!identity.machine_id.is_empty());
        assert!(!identity.hostname.is_empty());
        assert!(identity.cpu_count > 0);
    }

    #[test]
    fn test_full_report_classifies_as_full() {
        let identity = StaticIdentity::collect();
        let mut collector = Collector::new();
        let report = collector.full_report(&identity);
        assert!(report.is_full());
        assert!(report.ram_total.unwrap() > 0.0);
    }

    #[test]
    fn test_partial_report_classifies_as_partial() {
        let mut collector = Collector::new();
        let report = collector.partial_report("m1");
        assert!(!report.is_full());
        assert_eq!(report.machine_id, "m1");
        assert!(report.last_update.is_some());
    }

    #[test]
    fn test_disk_list_respects_size_floor() {
        let (disks, _, _) = disk_usage();
        for disk in &disks {
            assert!(disk.total >= 1.0);
        }
    }
}
