//! Error types for view-telemetry-core operations.
//!
//! Signal handlers never surface sink failures; `SinkError` is logged where it
//! happens and dropped.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Engine & Configuration Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    // ─────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Invalid position for {id}: positions start at 1")]
    InvalidPosition { id: String },

    #[error("Invalid result id: {reason}")]
    InvalidId { reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file unreadable: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Runtime Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Telemetry runtime is not running")]
    RuntimeStopped,

    #[error("Failed to spawn telemetry worker: {0}")]
    Spawn(#[source] std::io::Error),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sink Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sink rejected record: {0}")]
    Rejected(String),
}

/// Convenience type alias for Results using TelemetryError.
pub type Result<T> = std::result::Result<T, TelemetryError>;
