//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage locations disagree on the persisted identity.
    #[error("inconsistent metadata at {location}: {field} differs")]
    InconsistentMetadata {
        location: String,
        field: &'static str,
    },

    /// A metadata file could not be parsed.
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    /// A snapshot changed after its sidecar was written.
    #[error("snapshot checksum mismatch for {path}")]
    ImageChecksumMismatch { path: String },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Key or field decoding error.
    #[error("core error: {0}")]
    Core(#[from] counterseal_core::CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
