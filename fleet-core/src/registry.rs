//! The in-memory registry: single source of truth for the fleet's state.
//!
//! All mutations go through this component and are serialized behind one
//! write guard, so concurrent reports, the daemon's local reporter, and
//! delete requests never race on the record map. Reads hand out immutable
//! copies, never the live map.
//!
//! The registry is authoritative immediately; the durable store is a
//! best-effort mirror. A store failure is logged and the in-memory update
//! and broadcast proceed anyway.

use crate::broadcast::FanoutHub;
use crate::error::{FleetError, Result};
use crate::reconcile;
use crate::store::DeviceStore;
use crate::types::{DeviceRecord, Report, Snapshot};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Authoritative map from machine id to its current record.
pub struct Registry {
    records: RwLock<HashMap<String, DeviceRecord>>,
    store: DeviceStore,
    hub: FanoutHub,
}

impl Registry {
    /// Create an empty registry backed by `store`, broadcasting on `hub`.
    pub fn new(store: DeviceStore, hub: FanoutHub) -> Self {
        Self { records: RwLock::new(HashMap::new()), store, hub }
    }

    /// The hub this registry broadcasts on.
    pub fn hub(&self) -> &FanoutHub {
        &self.hub
    }

    /// Load all stored records into memory. Tolerates an unreachable store:
    /// the registry then starts empty and repopulates lazily as full
    /// reports arrive.
    pub async fn warm_load(&self) {
        match self.store.find_all().await {
            Ok(stored) => {
                let mut records = self.records.write().await;
                let count = stored.len();
                for record in stored {
                    records.insert(record.machine_id.clone(), record);
                }
                info!(records = count, "Registry warm-loaded from store");
            }
            Err(e) => {
                warn!(error = %e, "Store unreachable at startup, registry starts empty");
            }
        }
    }

    /// Apply an agent report and broadcast the resulting snapshot.
    ///
    /// A machine known to the store but not yet cached in memory counts as
    /// known: its stored record seeds the merge.
    #[instrument(skip(self, report), fields(machine_id = %report.machine_id))]
    pub async fn apply_report(&self, report: &Report) -> Result<DeviceRecord> {
        let mut records = self.records.write().await;

        let existing = match records.get(&report.machine_id) {
            Some(record) => Some(record.clone()),
            None if !report.machine_id.is_empty() => {
                // Warm-known path: the store may remember this machine from
                // a previous run. Store trouble downgrades to "unknown".
                match self.store.find_one(&report.machine_id).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(error = %e, "Store lookup failed, treating machine as unknown");
                        None
                    }
                }
            }
            None => None,
        };

        let merged = reconcile::merge(existing.as_ref(), report, Utc::now())?;
        records.insert(merged.machine_id.clone(), merged.clone());

        // Publish under the write guard so snapshots leave in mutation order
        self.hub.publish_snapshot(records.clone());
        drop(records);

        if let Err(e) = self.store.upsert(&merged).await {
            warn!(machine_id = %merged.machine_id, error = %e,
                "Write-through persist failed, registry state kept");
        }

        Ok(merged)
    }

    /// Create-or-replace merge for the request-style save/update endpoints.
    ///
    /// Unlike `apply_report`, an unknown machine does not need a full
    /// payload here: missing fields start from the unregistered baseline.
    #[instrument(skip(self, report), fields(machine_id = %machine_id))]
    pub async fn upsert(&self, machine_id: &str, mut report: Report) -> Result<DeviceRecord> {
        if machine_id.is_empty() {
            return Err(FleetError::MalformedReport {
                reason: "missing machine_id".to_string(),
            });
        }
        // The path parameter is authoritative over whatever the body says
        report.machine_id = machine_id.to_string();

        let now = Utc::now();
        let mut records = self.records.write().await;

        let existing = match records.get(machine_id) {
            Some(record) => record.clone(),
            None => match self.store.find_one(machine_id).await {
                Ok(Some(found)) => found,
                Ok(None) => DeviceRecord::unregistered(machine_id, now),
                Err(e) => {
                    warn!(error = %e, "Store lookup failed, starting from baseline");
                    DeviceRecord::unregistered(machine_id, now)
                }
            },
        };

        let merged = reconcile::merge(Some(&existing), &report, now)?;
        records.insert(merged.machine_id.clone(), merged.clone());

        self.hub.publish_snapshot(records.clone());
        drop(records);

        if let Err(e) = self.store.upsert(&merged).await {
            warn!(machine_id = %merged.machine_id, error = %e,
                "Write-through persist failed, registry state kept");
        }

        Ok(merged)
    }

    /// Remove a machine, clear its store row, and tell its agent to stop.
    ///
    /// This is the only path that removes a record while the system runs.
    #[instrument(skip(self), fields(machine_id = %machine_id))]
    pub async fn delete(&self, machine_id: &str) -> Result<()> {
        let mut records = self.records.write().await;

        if records.remove(machine_id).is_none() {
            return Err(FleetError::MachineNotFound { machine_id: machine_id.to_string() });
        }

        self.hub.publish_snapshot(records.clone());
        self.hub.publish_stop(machine_id);
        drop(records);

        if let Err(e) = self.store.delete(machine_id).await {
            warn!(machine_id = %machine_id, error = %e,
                "Store delete failed, will be overwritten if the machine re-registers");
        }

        info!(machine_id = %machine_id, "Machine deleted");
        Ok(())
    }

    /// Immutable point-in-time copy of the full map.
    pub async fn snapshot(&self) -> Snapshot {
        self.records.read().await.clone()
    }

    /// Point lookup for one machine.
    pub async fn get(&self, machine_id: &str) -> Option<DeviceRecord> {
        self.records.read().await.get(machine_id).cloned()
    }

    /// Whether the registry currently holds a record for this machine.
    pub async fn contains(&self, machine_id: &str) -> bool {
        self.records.read().await.contains_key(machine_id)
    }

    /// Number of records currently held.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Re-broadcast the current snapshot, for subscriber attach and
    /// explicit refresh requests.
    pub async fn refresh(&self) {
        let records = self.records.read().await;
        self.hub.publish_snapshot(records.clone());
    }
}
