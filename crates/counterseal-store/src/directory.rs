//! Storage-directory implementation of the MetadataStore trait.
//!
//! Each directory holds one `SEAL` properties file. This is the primary
//! backend for hosts that keep their metadata in several directories.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::properties::{read_properties, write_properties};
use crate::record::{reconcile, IdentityRecord};
use crate::traits::MetadataStore;

/// File name of the identity record inside each directory.
pub const SEAL_FILE: &str = "SEAL";

const HEADER: &str = "counterseal identity";

/// Identity record mirrored across storage directories.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dirs: Vec<PathBuf>,
}

impl DirectoryStore {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let dirs: Vec<PathBuf> = dirs.into_iter().map(Into::into).collect();
        if dirs.is_empty() {
            warn!("no storage directories configured, identity will not persist");
        }
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Path of the record file in `dir`.
    pub fn record_path(dir: &Path) -> PathBuf {
        dir.join(SEAL_FILE)
    }
}

#[async_trait]
impl MetadataStore for DirectoryStore {
    async fn load(&self) -> Result<Option<IdentityRecord>> {
        let mut entries = Vec::with_capacity(self.dirs.len());
        for dir in &self.dirs {
            let path = Self::record_path(dir);
            let record = match read_properties(&path).await? {
                Some(properties) => Some(IdentityRecord::from_properties(&properties)?),
                None => None,
            };
            debug!(path = %path.display(), found = record.is_some(), "read identity record");
            entries.push((path.display().to_string(), record));
        }
        reconcile(entries)
    }

    async fn save(&self, record: &IdentityRecord) -> Result<()> {
        let properties = record.to_properties();
        for dir in &self.dirs {
            tokio::fs::create_dir_all(dir).await?;
            write_properties(&Self::record_path(dir), HEADER, &properties).await?;
        }
        info!(dirs = self.dirs.len(), handle = ?record.handle, "saved identity record");
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
    async fn test_first_run_loads_nothing() {
        let root = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new([root.path().join("a"), root.path().join("b")]);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_writes_every_directory() {
        let root = tempfile::tempdir().unwrap();
        let dirs = [root.path().join("a"), root.path().join("b/nested")];
        let store = DirectoryStore::new(dirs.clone());
        let record = record();

        store.save(&record).await.unwrap();
        for dir in &dirs {
            assert!(dir.join(SEAL_FILE).exists());
        }
        assert_eq!(store.load().await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_missing_copy_is_inconsistent() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        DirectoryStore::new([&a]).save(&record()).await.unwrap();

        let err = DirectoryStore::new([&a, &b]).load().await.unwrap_err();
        assert!(matches!(err, StoreError::InconsistentMetadata { field: "record", .. }));
    }

    #[tokio::test]
    async fn test_disagreeing_copies() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        let first = record();
        let mut second = first.clone();
        second.handle = Some(Handle::random());

        DirectoryStore::new([&a]).save(&first).await.unwrap();
        DirectoryStore::new([&b]).save(&second).await.unwrap();

        let err = DirectoryStore::new([&a, &b]).load().await.unwrap_err();
        assert!(matches!(err, StoreError::InconsistentMetadata { field: "handle", .. }));
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::write(root.path().join(SEAL_FILE), "identity\n")
            .await
            .unwrap();
        let err = DirectoryStore::new([root.path()]).load().await.unwrap_err();
        assert!(matches!(err, StoreError::MalformedMetadata(_)));
    }
}
