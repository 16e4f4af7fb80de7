//! Error types for the session.

use counterseal_chain::ChainError;
use counterseal_client::{ClientError, TransportError};
use counterseal_core::CoreError;
use counterseal_store::StoreError;
use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Ledger client error.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Aggregator error.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Persistence error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Key or codec error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The transport could not be built.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The ledger is not the one the persisted record was written for.
    #[error("ledger identity has changed: saved {saved}, ledger {ledger}")]
    IdentityChanged { saved: String, ledger: String },

    /// No counter has been created or read yet.
    #[error("counter not initialized")]
    NotInitialized,
}

impl SessionError {
    /// Whether local state and the ledger disagree.
    pub fn is_divergence(&self) -> bool {
        match self {
            SessionError::Client(e) => e.is_divergence(),
            SessionError::Chain(e) => e.is_divergence(),
            _ => false,
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
