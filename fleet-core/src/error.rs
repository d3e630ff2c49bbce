//! Error types for fleetmon.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error
//! chains. Nothing in this taxonomy is fatal to a serving loop: callers
//! recover locally and surface the failure through logs.

use thiserror::Error;

/// Result type alias for fleetmon operations.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Main error type for fleetmon.
#[derive(Error, Debug)]
pub enum FleetError {
    // Reconciliation errors
    #[error("Unknown machine: partial report for {machine_id} rejected, full report required first")]
    UnknownMachine { machine_id: String },

    #[error("Malformed report: {reason}")]
    MalformedReport { reason: String },

    // Registry errors
    #[error("Machine not found: {machine_id}")]
    MachineNotFound { machine_id: String },

    // Durable store errors
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Transport errors
    #[error("Transport dropped: {reason}")]
    TransportDropped { reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
