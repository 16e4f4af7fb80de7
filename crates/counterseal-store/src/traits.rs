//! MetadataStore trait: the abstract interface for identity persistence.
//!
//! The session never touches files directly. Implementations include a set
//! of storage directories (primary), SQLite and in-memory (for tests).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::IdentityRecord;

/// Async interface for persisting the identity record.
///
/// # Design Notes
///
/// - **Every location**: `save` writes the record to every configured
///   location; `load` reads them all back.
/// - **Consistency**: locations that disagree on identity, public key or
///   handle fail the load with `InconsistentMetadata`.
/// - **First run**: no location holding a record loads as `None`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load the record, checking all locations agree.
    async fn load(&self) -> Result<Option<IdentityRecord>>;

    /// Save the record to every location.
    async fn save(&self, record: &IdentityRecord) -> Result<()>;
}

#[async_trait]
impl<S: MetadataStore + ?Sized> MetadataStore for Arc<S> {
    async fn load(&self) -> Result<Option<IdentityRecord>> {
        (**self).load().await
    }

    async fn save(&self, record: &IdentityRecord) -> Result<()> {
        (**self).save(record).await
    }
}
