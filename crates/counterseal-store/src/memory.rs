//! In-memory implementation of the MetadataStore trait.
//!
//! This is primarily for testing. Each location keeps the rendered file
//! text, so a test can corrupt or drop one copy and watch the load fail the
//! way it would on disk.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::properties::{parse_properties, render_properties};
use crate::record::{reconcile, IdentityRecord};
use crate::traits::MetadataStore;

const HEADER: &str = "counterseal identity";

/// In-memory store with one or more simulated locations.
///
/// All data is lost when the store is dropped.
pub struct MemoryStore {
    locations: Mutex<Vec<Option<String>>>,
}

impl MemoryStore {
    /// A store with a single location.
    pub fn new() -> Self {
        Self::with_locations(1)
    }

    /// A store with `count` locations, all empty.
    pub fn with_locations(count: usize) -> Self {
        Self {
            locations: Mutex::new(vec![None; count]),
        }
    }

    /// File text held at `index`.
    pub async fn raw(&self, index: usize) -> Option<String> {
        self.locations.lock().await.get(index).cloned().flatten()
    }

    /// Replace the file text at `index`; `None` deletes the copy.
    pub async fn set_raw(&self, index: usize, text: Option<String>) {
        if let Some(slot) = self.locations.lock().await.get_mut(index) {
            *slot = text;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn load(&self) -> Result<Option<IdentityRecord>> {
        let locations = self.locations.lock().await;
        let mut entries = Vec::with_capacity(locations.len());
        for (index, text) in locations.iter().enumerate() {
            let record = match text {
                Some(text) => Some(IdentityRecord::from_properties(&parse_properties(text)?)?),
                None => None,
            };
            entries.push((format!("memory:{index}"), record));
        }
        reconcile(entries)
    }

    async fn save(&self, record: &IdentityRecord) -> Result<()> {
        let text = render_properties(HEADER, &record.to_properties());
        for slot in self.locations.lock().await.iter_mut() {
            *slot = Some(text.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use counterseal_core::{Handle, PublicKeyFormat, ServiceIdentity, SigningKeyPair};

    fn record() -> IdentityRecord {
        let ledger = SigningKeyPair::generate();
        let service = ServiceIdentity::from_parts(
            &b"ledger"[..],
            ledger.public_key_bytes().unwrap(),
            PublicKeyFormat::Compressed,
        )
        .unwrap();
        IdentityRecord::new(&service, Handle::random(), &SigningKeyPair::generate())
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStore::with_locations(3);
        assert!(store.load().await.unwrap().is_none());

        let record = record();
        store.save(&record).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_dropped_copy_fails_load() {
        let store = MemoryStore::with_locations(2);
        store.save(&record()).await.unwrap();
        store.set_raw(1, None).await;

        let err = store.load().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InconsistentMetadata { ref location, .. } if location == "memory:1"
        ));
    }

    #[tokio::test]
    async fn test_edited_copy_fails_load() {
        let store = MemoryStore::with_locations(2);
        store.save(&record()).await.unwrap();

        let other = render_properties(HEADER, &record().to_properties());
        store.set_raw(0, Some(other)).await;
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::InconsistentMetadata { field: "identity" | "publicKey", .. }));
    }
}
