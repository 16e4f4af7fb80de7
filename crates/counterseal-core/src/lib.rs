//! # Counterseal Core
//!
//! Pure primitives for anchoring state digests into a signed counter ledger.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over keys, signatures and canonical messages.
//!
//! ## Key Types
//!
//! - [`ServiceIdentity`] - The ledger's name and verification key
//! - [`Operation`] / [`Receipt`] - Ledger operations and their signed results
//! - [`Handle`] / [`Tag`] / [`Nonce`] - Counter name, committed bytes, read freshness
//! - [`CounterState`] - Cached counter status (never a sentinel integer)
//!
//! ## Canonicalization
//!
//! Ledger signatures cover a dot-joined base64url message. See [`canonical`].

pub mod canonical;
pub mod counter;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod operation;
pub mod types;

pub use canonical::{canonical_bytes, canonical_message, decode_field, encode_field, MessageType};
pub use counter::{CounterState, CounterStatus};
pub use crypto::{
    generate_signing_key_pair, parse_public_key, sign, verify, Blake3Hash, PublicKeyFormat,
    RawSignature, SigningKeyPair, VerificationKey,
};
pub use error::CoreError;
pub use identity::ServiceIdentity;
pub use operation::{Operation, Receipt};
pub use types::{Handle, Nonce, Tag, HANDLE_LEN, NONCE_LEN};
