//! Reconciliation engine: merges incoming reports into canonical records.
//!
//! The merge is field-local. Every field present in the report overwrites the
//! corresponding field of the existing record; absent fields are preserved
//! unchanged. A full report may therefore refresh static identity, but it
//! never blanks a field it omits.

use crate::error::{FleetError, Result};
use crate::types::{DeviceRecord, Report};
use chrono::{DateTime, Utc};

/// Apply `report` against `existing`, producing the new canonical record.
///
/// - Unknown machine + partial report: rejected with `UnknownMachine`, no
///   record is created.
/// - Unknown machine + full report: creates the record, defaulting
///   `platform` to `"-"` when unset.
/// - Known machine: present fields overwrite, absent fields survive.
///
/// `now` is the processing time; it stamps `last_update` unless the report
/// supplies its own timestamp, which is trusted verbatim.
pub fn merge(
    existing: Option<&DeviceRecord>,
    report: &Report,
    now: DateTime<Utc>,
) -> Result<DeviceRecord> {
    if report.machine_id.is_empty() {
        return Err(FleetError::MalformedReport {
            reason: "missing machine_id".to_string(),
        });
    }

    let mut record = match existing {
        Some(record) => record.clone(),
        None => {
            if !report.is_full() {
                return Err(FleetError::UnknownMachine {
                    machine_id: report.machine_id.clone(),
                });
            }
            // is_full() guarantees the static identity fields below are
            // present and will be filled in by the field merge
            DeviceRecord::unregistered(&report.machine_id, now)
        }
    };

    if let Some(hostname) = &report.hostname {
        record.hostname = hostname.clone();
    }
    if let Some(os) = &report.os {
        record.os = os.clone();
    }
    if let Some(ip) = &report.ip {
        record.ip = ip.clone();
    }
    if let Some(cpu_count) = report.cpu_count {
        record.cpu_count = cpu_count;
    }
    if let Some(platform) = &report.platform {
        record.platform = platform.clone();
    }
    if let Some(cpu_percent) = report.cpu_percent {
        record.cpu_percent = cpu_percent;
    }
    if let Some(ram_used) = report.ram_used {
        record.ram_used = ram_used;
    }
    if let Some(ram_total) = report.ram_total {
        record.ram_total = ram_total;
    }
    if let Some(ram_percent) = report.ram_percent {
        record.ram_percent = ram_percent;
    }
    if let Some(disk_used) = report.disk_used {
        record.disk_used = disk_used;
    }
    if let Some(disk_total) = report.disk_total {
        record.disk_total = disk_total;
    }
    if let Some(disk_percent) = report.disk_percent {
        record.disk_percent = disk_percent;
    }
    if let Some(disks) = &report.disks {
        record.disks = disks.clone();
    }

    record.last_update = report.last_update.unwrap_or(now);

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiskUsage;

    fn full_report(machine_id: &str) -> Report {
        Report {
            machine_id: machine_id.to_string(),
            hostname: Some("h1".to_string()),
            os: Some("Linux 6.8".to_string()),
            ip: Some("10.0.0.5".to_string()),
            cpu_count: Some(4),
            cpu_percent: Some(10.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_partial_for_unknown_machine_rejected() {
        let report = Report {
            machine_id: "m1".to_string(),
            cpu_percent: Some(55.0),
            ..Default::default()
        };
        let err = merge(None, &report, Utc::now()).unwrap_err();
        assert!(matches!(err, FleetError::UnknownMachine { machine_id } if machine_id == "m1"));
    }

    #[test]
    fn test_full_for_unknown_machine_creates_record() {
        let record = merge(None, &full_report("m1"), Utc::now()).unwrap();
        assert_eq!(record.machine_id, "m1");
        assert_eq!(record.hostname, "h1");
        assert_eq!(record.cpu_count, 4);
        assert_eq!(record.cpu_percent, 10.0);
        assert_eq!(record.platform, "-");
    }

    #[test]
    fn test_partial_merge_is_field_local() {
        let now = Utc::now();
        let base = merge(None, &full_report("m1"), now).unwrap();

        let partial = Report {
            machine_id: "m1".to_string(),
            cpu_percent: Some(55.0),
            ..Default::default()
        };
        let merged = merge(Some(&base), &partial, Utc::now()).unwrap();

        assert_eq!(merged.cpu_percent, 55.0);
        assert_eq!(merged.hostname, "h1");
        assert_eq!(merged.cpu_count, 4);
        assert_eq!(merged.os, "Linux 6.8");
    }

    #[test]
    fn test_full_refresh_does_not_blank_omitted_fields() {
        let now = Utc::now();
        let mut base = merge(None, &full_report("m1"), now).unwrap();
        base.platform = "rack-7".to_string();
        base.disks = vec![DiskUsage {
            mount: "/dev/sda1".to_string(),
            used: 20.0,
            total: 100.0,
            percent: 20.0,
        }];

        // Second full report with new identity but no platform or disks
        let mut refresh = full_report("m1");
        refresh.hostname = Some("h1-renamed".to_string());
        let merged = merge(Some(&base), &refresh, Utc::now()).unwrap();

        assert_eq!(merged.hostname, "h1-renamed");
        assert_eq!(merged.platform, "rack-7");
        assert_eq!(merged.disks.len(), 1);
    }

    #[test]
    fn test_missing_machine_id_is_malformed() {
        let report = Report { machine_id: String::new(), ..Default::default() };
        let err = merge(None, &report, Utc::now()).unwrap_err();
        assert!(matches!(err, FleetError::MalformedReport { .. }));
    }

    #[test]
    fn test_supplied_timestamp_trusted_verbatim() {
        let supplied = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let mut report = full_report("m1");
        report.last_update = Some(supplied);
        let record = merge(None, &report, Utc::now()).unwrap();
        assert_eq!(record.last_update, supplied);
    }

    #[test]
    fn test_missing_timestamp_stamped_with_processing_time() {
        let now = Utc::now();
        let record = merge(None, &full_report("m1"), now).unwrap();
        assert_eq!(record.last_update, now);
    }
}
