//! Custom error types for Rollcall
//!
//! This module defines the error hierarchy for the backup subsystem using
//! thiserror for ergonomic error definitions.
//!
//! Validation, not-found, state and conflict errors are returned to the caller
//! synchronously. I/O and integrity failures that happen inside a background
//! backup are recorded on the artifact instead of being thrown.

use thiserror::Error;

/// The main error type for Rollcall operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Operation is not allowed in the entity's current status
    #[error("Invalid state: {0}")]
    State(String),

    /// Duplicate names, busy locks, or restore conflicts without force
    #[error("Conflict: {0}")]
    Conflict(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Checksum or chain integrity failures
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Encryption errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operator cancelled a running operation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Operation exceeded its maximum duration
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl VaultError {
    /// Create a "not found" error for backup artifacts
    pub fn artifact_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Artifact",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for schedules
    pub fn schedule_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Schedule",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for restore points
    pub fn restore_point_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Restore point",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a state error
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<walkdir::Error> for VaultError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for Rollcall operations
pub type VaultResult<T> = Result<T, VaultError>;
