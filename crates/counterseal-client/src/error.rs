//! Error types for the ledger client.

use thiserror::Error;

use counterseal_core::{CoreError, Handle};

/// Errors that can occur while talking to the ledger.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response. For create and increment the
    /// ledger may or may not have applied it.
    #[error("transport failure during {operation}: {message}")]
    TransportFailure {
        operation: &'static str,
        message: String,
    },

    /// The ledger answered with a non-success status.
    #[error("ledger fault during {operation}: status {status}")]
    LedgerFault { operation: &'static str, status: u16 },

    /// A counter already exists for this handle.
    #[error("counter already exists for handle {0}")]
    Conflict(Handle),

    /// The response signature does not verify against the ledger's key.
    #[error("untrusted {operation} response: signature does not verify")]
    UntrustedResponse { operation: &'static str },

    /// Cached and ledger-reported state disagree.
    #[error("divergence detected ({reason}): local={local:?}, ledger={ledger}")]
    DivergenceDetected {
        local: Option<u64>,
        ledger: u64,
        reason: &'static str,
    },

    /// The response body is not JSON.
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// The JSON body is missing fields or carries undecodable values.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The counter has no verified value yet.
    #[error("counter not initialized")]
    NotInitialized,

    /// Key or field decoding failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ClientError {
    /// Whether blindly repeating the call is safe.
    ///
    /// Only transport failures of idempotent operations qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::TransportFailure { operation, .. }
                if *operation == FETCH_IDENTITY || *operation == READ_LATEST
        )
    }

    pub fn is_divergence(&self) -> bool {
        matches!(self, ClientError::DivergenceDetected { .. })
    }

    /// Whether a read failed because the ledger has no counter for the handle.
    pub fn is_missing_counter(&self) -> bool {
        matches!(
            self,
            ClientError::LedgerFault { operation, status: NOT_FOUND } if *operation == READ_LATEST
        )
    }
}

/// Status the ledger answers for an unknown handle.
pub const NOT_FOUND: u16 = 404;

pub(crate) const FETCH_IDENTITY: &str = "fetch_identity";
pub(crate) const NEW_COUNTER: &str = "new_counter";
pub(crate) const READ_LATEST: &str = "read_latest";
pub(crate) const INCREMENT_COUNTER: &str = "increment_counter";

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
