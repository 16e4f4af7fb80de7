//! Error types for Counterseal core.

use thiserror::Error;

/// Errors raised by key handling, signature codec and field decoding.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key bytes have the wrong length or do not describe a point on P-256.
    #[error("invalid key data: {0}")]
    InvalidKeyData(String),

    /// The signature backend could not be set up for the given key material.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// The key pair has no private half.
    #[error("signing key pair cannot sign: private key is absent")]
    MissingPrivateKey,

    /// A handle was not exactly 16 bytes.
    #[error("invalid handle length: expected 16, got {0}")]
    InvalidHandle(usize),

    /// A nonce was not exactly 16 bytes.
    #[error("invalid nonce length: expected 16, got {0}")]
    InvalidNonce(usize),

    /// A raw signature was not exactly 64 bytes.
    #[error("invalid signature length: expected 64, got {0}")]
    InvalidSignatureLength(usize),

    /// A base64url field could not be decoded.
    #[error("decoding error: {0}")]
    DecodingError(String),
}
