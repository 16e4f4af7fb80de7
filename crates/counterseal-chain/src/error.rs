//! Error types for the batch aggregator.

use thiserror::Error;

/// Errors that can occur while aggregating and committing batches.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Records are absorbed but not yet committed.
    #[error("{count} records are still pending; flush before recording an image")]
    PendingRecords { count: usize },

    /// Locally reconstructed state disagrees with the ledger.
    #[error("divergence detected ({reason}): local counter={local_counter}, ledger counter={ledger_counter}")]
    DivergenceDetected {
        local_counter: u64,
        ledger_counter: u64,
        reason: &'static str,
    },

    /// A tag reported by the ledger carries a signature that does not verify.
    #[error("untrusted response: {0}")]
    UntrustedResponse(String),

    /// A record could not be serialized.
    #[error("record encoding failed: {0}")]
    RecordEncoding(#[from] std::io::Error),

    /// Ledger client error.
    #[error("client error: {0}")]
    Client(#[from] counterseal_client::ClientError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] counterseal_core::CoreError),
}

impl ChainError {
    /// Whether this error means the tamper-evidence chain is broken.
    pub fn is_divergence(&self) -> bool {
        match self {
            ChainError::DivergenceDetected { .. } => true,
            ChainError::Client(e) => e.is_divergence(),
            _ => false,
        }
    }
}

/// Result type for aggregator operations.
pub type Result<T> = std::result::Result<T, ChainError>;
