// src/error.rs

//! Error types for the provisioning system

use thiserror::Error;

/// Errors raised by the provisioning core
///
/// The first eight variants form the provisioning taxonomy; the rest are
/// ambient filesystem and path failures. Device-facing callers should not
/// show these directly, see [`crate::issue::Fault`].
#[derive(Error, Debug)]
pub enum Error {
    /// Server-side install state is corrupt or partially missing
    #[error("Local integrity error: {0}")]
    LocalIntegrity(String),

    /// A batch is structurally invalid or incompatible with the install
    #[error("Incoming integrity error: {0}")]
    IncomingIntegrity(String),

    /// The operation needs an initialized install
    #[error("Provisioning system not initialized: {0}")]
    Uninitialized(String),

    /// Every set is assigned to some other device
    #[error("No unassigned provisioning sets available")]
    NoFreeSets,

    /// Underlying SQLite fault
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A named archive member does not exist
    #[error("Archive entry missing: {0}")]
    ArchiveEntryMissing(String),

    /// Malformed project configuration
    #[error("Failed to parse project configuration: {0}")]
    ConfigParse(String),

    /// Set table cannot be created from the declared dynamic files
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigParse(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
