//! Durable store adapter over SQLite.
//!
//! Narrow upsert/find/delete contract keyed by machine id. The registry is
//! authoritative while the process runs; this store is authoritative for
//! recovery across restarts. Every failure surfaces as `StoreUnavailable`
//! and callers on the serving path treat it as best-effort.

use crate::error::{FleetError, Result};
use crate::types::{DeviceRecord, DiskUsage};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, instrument};

mod migrations;

/// Durable mirror of the registry, one row per machine.
#[derive(Clone)]
pub struct DeviceStore {
    pool: SqlitePool,
}

impl DeviceStore {
    /// Create a store backed by an in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open (or create) the store at the given path and run migrations.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Opening device store at {:?}", db_path);

        if db_path != Path::new(":memory:") {
            if let Some(parent) = db_path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    FleetError::InvalidConfig {
                        reason: format!("Failed to create directory {}: {}", parent.display(), e),
                    }
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_path.to_str().ok_or_else(|| {
            FleetError::InvalidConfig { reason: "Invalid database path".to_string() }
        })?)
        .map_err(|e| FleetError::StoreUnavailable(e.to_string()))?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

        // A pooled :memory: database exists per connection; pin tests to one
        let pool_options = if db_path == Path::new(":memory:") {
            SqlitePoolOptions::new().min_connections(1).max_connections(1).idle_timeout(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| FleetError::StoreUnavailable(e.to_string()))?;

        migrations::run(&pool).await?;

        info!("Device store ready");
        Ok(Self { pool })
    }

    /// Idempotent write: creates or overwrites the row for this machine.
    #[instrument(skip(self, record), fields(machine_id = %record.machine_id))]
    pub async fn upsert(&self, record: &DeviceRecord) -> Result<()> {
        let disks_json = serde_json::to_string(&record.disks)
            .map_err(|e| FleetError::Internal(format!("Failed to serialize disks: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO devices (
                machine_id, hostname, os, ip, cpu_count, platform,
                cpu_percent, ram_used, ram_total, ram_percent,
                disk_used, disk_total, disk_percent, disks, last_update
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(machine_id) DO UPDATE SET
                hostname = excluded.hostname,
                os = excluded.os,
                ip = excluded.ip,
                cpu_count = excluded.cpu_count,
                platform = excluded.platform,
                cpu_percent = excluded.cpu_percent,
                ram_used = excluded.ram_used,
                ram_total = excluded.ram_total,
                ram_percent = excluded.ram_percent,
                disk_used = excluded.disk_used,
                disk_total = excluded.disk_total,
                disk_percent = excluded.disk_percent,
                disks = excluded.disks,
                last_update = excluded.last_update
            "#,
        )
        .bind(&record.machine_id)
        .bind(&record.hostname)
        .bind(&record.os)
        .bind(&record.ip)
        .bind(record.cpu_count as i64)
        .bind(&record.platform)
        .bind(record.cpu_percent)
        .bind(record.ram_used)
        .bind(record.ram_total)
        .bind(record.ram_percent)
        .bind(record.disk_used)
        .bind(record.disk_total)
        .bind(record.disk_percent)
        .bind(disks_json)
        .bind(record.last_update.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::counter!("fleet_store_errors_total", "operation" => "upsert").increment(1);
            FleetError::StoreUnavailable(e.to_string())
        })?;

        Ok(())
    }

    /// Fetch the stored record for one machine, `None` when absent.
    #[instrument(skip(self), fields(machine_id = %machine_id))]
    pub async fn find_one(&self, machine_id: &str) -> Result<Option<DeviceRecord>> {
        let row = sqlx::query("SELECT * FROM devices WHERE machine_id = ?")
            .bind(machine_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                metrics::counter!("fleet_store_errors_total", "operation" => "find_one")
                    .increment(1);
                FleetError::StoreUnavailable(e.to_string())
            })?;

        row.map(row_to_record).transpose()
    }

    /// Fetch all stored records, oldest update first.
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<DeviceRecord>> {
        let rows = sqlx::query("SELECT * FROM devices ORDER BY last_update ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                metrics::counter!("fleet_store_errors_total", "operation" => "find_all")
                    .increment(1);
                FleetError::StoreUnavailable(e.to_string())
            })?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Remove the row for one machine. No-op when absent.
    #[instrument(skip(self), fields(machine_id = %machine_id))]
    pub async fn delete(&self, machine_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM devices WHERE machine_id = ?")
            .bind(machine_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::counter!("fleet_store_errors_total", "operation" => "delete")
                    .increment(1);
                FleetError::StoreUnavailable(e.to_string())
            })?;

        Ok(())
    }
}

fn row_to_record(row: SqliteRow) -> Result<DeviceRecord> {
    let disks_json: String = row.get("disks");
    let disks: Vec<DiskUsage> = serde_json::from_str(&disks_json)
        .map_err(|e| FleetError::Internal(format!("Failed to deserialize disks: {}", e)))?;

    let last_update_str: String = row.get("last_update");
    let last_update = last_update_str
        .parse::<DateTime<Utc>>()
        .map_err(|e| FleetError::Internal(format!("Failed to parse last_update: {}", e)))?;

    let cpu_count: i64 = row.get("cpu_count");

    Ok(DeviceRecord {
        machine_id: row.get("machine_id"),
        hostname: row.get("hostname"),
        os: row.get("os"),
        ip: row.get("ip"),
        cpu_count: cpu_count as u32,
        platform: row.get("platform"),
        cpu_percent: row.get("cpu_percent"),
        ram_used: row.get("ram_used"),
        ram_total: row.get("ram_total"),
        ram_percent: row.get("ram_percent"),
        disk_used: row.get("disk_used"),
        disk_total: row.get("disk_total"),
        disk_percent: row.get("disk_percent"),
        disks,
        last_update,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(machine_id: &str) -> DeviceRecord {
        DeviceRecord {
            machine_id: machine_id.to_string(),
            hostname: "h1".to_string(),
            os: "Linux 6.8".to_string(),
            ip: "10.0.0.5".to_string(),
            cpu_count: 8,
            platform: "-".to_string(),
            cpu_percent: 12.5,
            ram_used: 4.0,
            ram_total: 16.0,
            ram_percent: 25.0,
            disk_used: 100.0,
            disk_total: 500.0,
            disk_percent: 20.0,
            disks: vec![DiskUsage {
                mount: "/dev/sda1".to_string(),
                used: 100.0,
                total: 500.0,
                percent: 20.0,
            }],
            last_update: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_find_one() {
        let store = DeviceStore::new_in_memory().await.unwrap();
        let record = sample_record("m1");

        store.upsert(&record).await.unwrap();

        let found = store.find_one("m1").await.unwrap().unwrap();
        assert_eq!(found.hostname, "h1");
        assert_eq!(found.cpu_count, 8);
        assert_eq!(found.disks.len(), 1);
        assert_eq!(found.disks[0].mount, "/dev/sda1");
    }

    #[tokio::test]
    async fn test_find_one_absent() {
        let store = DeviceStore::new_in_memory().await.unwrap();
        assert!(store.find_one("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = DeviceStore::new_in_memory().await.unwrap();
        let mut record = sample_record("m1");
        store.upsert(&record).await.unwrap();

        record.cpu_percent = 99.0;
        store.upsert(&record).await.unwrap();

        let found = store.find_one("m1").await.unwrap().unwrap();
        assert_eq!(found.cpu_percent, 99.0);

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_find_all() {
        let store = DeviceStore::new_in_memory().await.unwrap();
        store.upsert(&sample_record("m1")).await.unwrap();
        store.upsert(&sample_record("m2")).await.unwrap();

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_is_noop_when_absent() {
        let store = DeviceStore::new_in_memory().await.unwrap();
        store.delete("nope").await.unwrap();

        store.upsert(&sample_record("m1")).await.unwrap();
        store.delete("m1").await.unwrap();
        assert!(store.find_one("m1").await.unwrap().is_none());
    }
}
