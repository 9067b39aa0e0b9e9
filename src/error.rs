//! Error types for the lease directory.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. Lookups never fail; only
//! mutating operations and lifecycle control do.

use std::fmt;

/// Which uniqueness constraint a conflicting mutation violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Address,
    HardwareAddr,
    Hostname,
}

impl fmt::Display for ConflictField {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Address => "address",
            Self::HardwareAddr => "hardware address",
            Self::Hostname => "hostname",
        };
        formatter.write_str(name)
    }
}

/// Errors that can occur during lease directory operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config or lease files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A lease is missing a required field or carries a malformed value.
    ///
    /// This includes an unspecified address, an empty hostname or hardware
    /// address, and a dynamic lease whose expiry is not in the future.
    #[error("Invalid lease: {0}")]
    InvalidLease(String),

    /// The value is already bound to a different live lease.
    #[error("Conflict: {field} {value} is already leased")]
    Conflict { field: ConflictField, value: String },

    /// The update or remove target does not exist.
    ///
    /// Also returned when an update targets a dynamic lease.
    #[error("Lease not found: {0}")]
    NotFound(String),

    /// The directory has been shut down.
    #[error("Lease directory is unavailable")]
    Unavailable,

    /// Shutdown was cancelled before in-flight operations drained.
    #[error("Shutdown cancelled")]
    Cancelled,

    /// Invalid service configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate) when the
    /// configuration contains invalid values (e.g., range_start > range_end).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Textual hardware address could not be parsed.
    #[error("Invalid hardware address: {0}")]
    InvalidHardwareAddr(String),

    /// Persistent client has no name, no identifiers, or an empty one.
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// A persistent client with this name or identifier is already registered.
    #[error("Client {0} already exists")]
    ClientExists(String),
}

impl Error {
    pub(crate) fn conflict(field: ConflictField, value: impl fmt::Display) -> Self {
        Self::Conflict {
            field,
            value: value.to_string(),
        }
    }
}

/// A specialized Result type for lease directory operations.
pub type Result<T> = std::result::Result<T, Error>;
