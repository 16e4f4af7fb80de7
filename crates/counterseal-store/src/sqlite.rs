//! SQLite implementation of the MetadataStore trait.
//!
//! For hosts that keep their metadata in a database rather than in storage
//! directories. The record is one row per property, so the table reads the
//! same as a `SEAL` file.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::properties::Properties;
use crate::record::IdentityRecord;
use crate::traits::MetadataStore;

/// SQLite-backed identity store.
///
/// Thread-safe via internal Mutex. The database is a single location.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&mut conn)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn load(&self) -> Result<Option<IdentityRecord>> {
        let properties = self.with_conn_mut(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM seal_metadata")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut properties = Properties::new();
            for row in rows {
                let (key, value): (String, String) = row?;
                properties.insert(key, value);
            }
            Ok(properties)
        })?;

        if properties.is_empty() {
            return Ok(None);
        }
        IdentityRecord::from_properties(&properties).map(Some)
    }

    async fn save(&self, record: &IdentityRecord) -> Result<()> {
        let properties = record.to_properties();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM seal_metadata", [])?;
            let now = migration::now_millis();
            for (key, value) in &properties {
                tx.execute(
                    "INSERT INTO seal_metadata (key, value, updated_at) VALUES (?1, ?2, ?3)",
                    params![key, value, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;
        info!(handle = ?record.handle, "saved identity record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn test_empty_database_loads_nothing() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_record() {
        let store = SqliteStore::open_memory().unwrap();
        let first = record();
        let second = record();

        store.save(&first).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(first));
        store.save(&second).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seal.db");
        let record = record();

        SqliteStore::open(&path).unwrap().save(&record).await.unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(record));
    }
}
