//! Database migrations for the device store.

use crate::error::{FleetError, Result};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 1;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| FleetError::MigrationFailed { reason: e.to_string() })?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| FleetError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Store schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating store from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(|e| FleetError::MigrationFailed { reason: e.to_string() })?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await
        .map_err(|e| FleetError::MigrationFailed { reason: e.to_string() })?;

    Ok(())
}

async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            machine_id TEXT PRIMARY KEY,
            hostname TEXT NOT NULL,
            os TEXT NOT NULL,
            ip TEXT NOT NULL,
            cpu_count INTEGER NOT NULL,
            platform TEXT NOT NULL DEFAULT '-',
            cpu_percent REAL NOT NULL DEFAULT 0,
            ram_used REAL NOT NULL DEFAULT 0,
            ram_total REAL NOT NULL DEFAULT 0,
            ram_percent REAL NOT NULL DEFAULT 0,
            disk_used REAL NOT NULL DEFAULT 0,
            disk_total REAL NOT NULL DEFAULT 0,
            disk_percent REAL NOT NULL DEFAULT 0,
            disks TEXT NOT NULL DEFAULT '[]',
            last_update TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| FleetError::MigrationFailed { reason: e.to_string() })?;

    Ok(())
}
