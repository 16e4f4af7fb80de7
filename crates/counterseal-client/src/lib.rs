//! # Counterseal Client
//!
//! Verified access to a signed counter ledger.
//!
//! ## Overview
//!
//! The ledger keeps one append-only sequence of `(counter, tag)` pairs per
//! handle and signs every answer. [`LedgerClient`] issues the three
//! operations, rebuilds each canonical message and refuses any response
//! whose signature does not verify.
//!
//! ## Key Properties
//!
//! - **Serialized**: one in-flight operation per client
//! - **Fresh reads**: every read carries a new random nonce
//! - **Explicit state**: the cached counter is `Uninitialized`, `Known` or `Divergent`
//!
//! ## Message Flow
//!
//! ```text
//! Client                              Ledger
//!   |-------- GET /serviceid ---------->|
//!   |<------- Identity, PublicKey ------|
//!   |-------- PUT /counters/{h} ------->|
//!   |<------- Signature ----------------|
//!   |-------- POST /counters/{h} ------>|
//!   |<------- Signature ----------------|
//!   |-------- GET /counters/{h}?nonce ->|
//!   |<------- Counter, Tag, Signature --|
//! ```

pub mod client;
pub mod error;
pub mod messages;
pub mod transport;

pub use client::{fetch_identity, LedgerClient};
pub use error::{ClientError, Result, NOT_FOUND};
pub use transport::{
    http::{HttpTransport, DEFAULT_ENDPOINT},
    memory::{Fault, MemoryLedger},
    LedgerRequest, LedgerResponse, Method, Transport, TransportError,
};
