//! Fleetmon Core Library
//!
//! Shared types, the reconciliation engine, the in-memory registry, and the
//! durable store for the fleetmon state synchronization engine.

pub mod broadcast;
pub mod collect;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use broadcast::{FanoutEvent, FanoutHub};
pub use error::{FleetError, Result};
pub use observability::init as init_observability;
pub use registry::Registry;
pub use store::DeviceStore;
pub use types::{DeviceRecord, DiskUsage, Report, Snapshot};
