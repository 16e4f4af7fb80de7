//! # Counterseal Store
//!
//! Persistence for the client's identity record and for snapshot sidecars.
//!
//! ## Overview
//!
//! The identity record names the ledger (identity and public key), the
//! counter handle and the client's tag-signing keys. It is stored behind the
//! [`MetadataStore`] trait, so the session never touches files directly.
//! The primary implementation is [`DirectoryStore`], with [`SqliteStore`]
//! for database-backed hosts and [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`MetadataStore`] - The async trait for loading and saving the record
//! - [`IdentityRecord`] - The persisted fields, as base64url properties
//! - [`DirectoryStore`] - One `SEAL` file per storage directory
//! - [`ImageInfo`] - What a snapshot was committed as, kept in `<snapshot>.seal`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use counterseal_store::{DirectoryStore, MetadataStore};
//!
//! async fn example() {
//!     let store = DirectoryStore::new(["/data/name1/current", "/data/name2/current"]);
//!     // None on first run; InconsistentMetadata if the copies disagree.
//!     let record = store.load().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Mirrored**: every location holds the full record
//! - **Atomic writes**: files are replaced through a rename
//! - **Content-bound snapshots**: a snapshot's tag covers its checksum and
//!   the counter it was committed at

pub mod directory;
pub mod error;
pub mod image;
pub mod memory;
pub mod migration;
pub mod properties;
pub mod record;
pub mod sqlite;
pub mod traits;

pub use directory::{DirectoryStore, SEAL_FILE};
pub use error::{Result, StoreError};
pub use image::{
    checksum_file, image_tag, load_image_info, rename_image_info, save_image_info, sidecar_path,
    verify_image_info, verify_image_tag, ImageInfo, IMAGE_EXTENSION,
};
pub use memory::MemoryStore;
pub use record::IdentityRecord;
pub use sqlite::SqliteStore;
pub use traits::MetadataStore;
