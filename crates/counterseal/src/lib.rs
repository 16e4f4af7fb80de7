//! # Counterseal
//!
//! Tamper evidence for log-structured metadata: a writer folds its log
//! records and snapshots into tags and anchors them in an external signed
//! counter ledger, so a rollback, fork or edit of its persisted state is
//! detected on the next restart.
//!
//! ## Overview
//!
//! - **Ledger client**: every ledger response is verified against the
//!   ledger's P-256 key before it is trusted
//! - **Aggregator**: records are batched into counter-bound digests and
//!   committed one tag per batch
//! - **Replay**: after a restart the same records rebuild the same tags,
//!   which are checked against a fresh verified read
//! - **Snapshots**: a snapshot's tag covers its checksum and the counter it
//!   was committed at
//!
//! ## Message Flow
//!
//! ```text
//! record ─► Aggregator ─► batch full ─► tag ─► LedgerClient ─► ledger
//!                                                   │
//!                                         signature verified
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use counterseal::{SealConfig, Session, Tag};
//! use counterseal::chain::RawRecord;
//! use counterseal::store::DirectoryStore;
//!
//! async fn example() {
//!     let config = SealConfig::default();
//!     let transport = config.http_transport().unwrap();
//!     let store = DirectoryStore::new(["/data/name1/current"]);
//!
//!     let session = Session::open(transport, store, config).await.unwrap();
//!     if !session.is_initialized().await {
//!         session.initialize(Tag::from("initialize")).await.unwrap();
//!     }
//!
//!     let (counter, tag) = session.latest().await.unwrap();
//!     let aggregator = session.aggregator(counter, tag);
//!     aggregator.add(&RawRecord::new(0x01, &b"mkdir /a"[..])).await.unwrap();
//!     aggregator.flush().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `counterseal::core` - Codecs, keys, receipts
//! - `counterseal::client` - Ledger client and transports
//! - `counterseal::chain` - Batch aggregator
//! - `counterseal::store` - Identity persistence and snapshot sidecars

pub mod config;
pub mod error;
pub mod session;

// Re-export component crates
pub use counterseal_chain as chain;
pub use counterseal_client as client;
pub use counterseal_core as core;
pub use counterseal_store as store;

pub use config::SealConfig;
pub use error::{Result, SessionError};
pub use session::Session;

// Re-export commonly used types
pub use counterseal_chain::{Aggregator, ChainMode, Commit, LogRecord, Mode};
pub use counterseal_core::{Handle, PublicKeyFormat, Receipt, SigningKeyPair, Tag};
pub use counterseal_store::{ImageInfo, MetadataStore};
