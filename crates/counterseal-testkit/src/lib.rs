//! # Counterseal Testkit
//!
//! Testing utilities for Counterseal.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Canonical signed messages with their expected encoding
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A session wired to a simulated ledger and in-memory metadata
//!
//! ## Golden Vectors
//!
//! ```rust
//! use counterseal_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, produced) in verify_all_vectors() {
//!     assert!(matches, "{name}: {produced}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use counterseal_testkit::generators::raw_signature;
//!
//! proptest! {
//!     #[test]
//!     fn der_starts_with_sequence(signature in raw_signature()) {
//!         prop_assert_eq!(signature.to_der()[0], 0x30);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use counterseal_testkit::fixtures::{records, TestFixture};
//!
//! let fixture = TestFixture::new();
//! let session = fixture.format("genesis").await?;
//! let aggregator = session.aggregator(0, "genesis".into());
//! for record in records(0, 4) {
//!     aggregator.add(&record).await?;
//! }
//! // A second open is a restart against the same ledger and metadata.
//! let restarted = fixture.open().await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{record, records, TestFixture, TestSession};
pub use generators::{raw_record, raw_signature, signing_key_pair, tag};
pub use vectors::{all_vectors, message_from_vector, verify_all_vectors, GoldenVector};
