//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a session wired to a simulated
//! ledger and an in-memory metadata store.

use std::sync::Arc;

use counterseal::{Result, SealConfig, Session};
use counterseal_chain::RawRecord;
use counterseal_client::MemoryLedger;
use counterseal_core::Tag;
use counterseal_store::MemoryStore;

/// Session type the fixtures produce.
pub type TestSession = Session<Arc<MemoryLedger>, Arc<MemoryStore>>;

/// A simulated ledger plus the metadata a writer persisted.
///
/// Opening twice from one fixture is a process restart.
pub struct TestFixture {
    pub ledger: Arc<MemoryLedger>,
    pub store: Arc<MemoryStore>,
    pub config: SealConfig,
}

impl TestFixture {
    /// A fresh ledger and one empty storage location.
    pub fn new() -> Self {
        Self::with_config(SealConfig::default())
    }

    pub fn with_config(config: SealConfig) -> Self {
        Self {
            ledger: Arc::new(MemoryLedger::new()),
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }

    /// Use `count` storage locations.
    pub fn with_locations(mut self, count: usize) -> Self {
        self.store = Arc::new(MemoryStore::with_locations(count));
        self
    }

    /// Open a session from whatever is persisted.
    pub async fn open(&self) -> Result<TestSession> {
        Session::open(
            Arc::clone(&self.ledger),
            Arc::clone(&self.store),
            self.config.clone(),
        )
        .await
    }

    /// Format: fresh handle, counter created with `initial_tag`.
    pub async fn format(&self, initial_tag: impl Into<Tag>) -> Result<TestSession> {
        Session::format(
            Arc::clone(&self.ledger),
            Arc::clone(&self.store),
            self.config.clone(),
            initial_tag.into(),
        )
        .await
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// The `n`th record of a deterministic host log.
pub fn record(n: u32) -> RawRecord {
    let opcode = (n % 16) as u8;
    RawRecord::new(opcode, format!("op {n}: /dir{}/file{n}", n % 7).into_bytes())
}

/// Records `start..end` of the deterministic host log.
pub fn records(start: u32, end: u32) -> Vec<RawRecord> {
    (start..end).map(record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterseal_chain::LogRecord;

    #[test]
    fn test_records_are_deterministic() {
        assert_eq!(records(0, 10), records(0, 10));
        assert_ne!(record(1), record(2));
    }

    #[test]
    fn test_records_never_flush() {
        assert!(records(0, 256).iter().all(|r| !r.is_flush()));
    }

    #[tokio::test]
    async fn test_format_then_open() {
        let fixture = TestFixture::new();
        let formatted = fixture.format("genesis").await.unwrap();
        let handle = *formatted.handle();

        let reopened = fixture.open().await.unwrap();
        assert_eq!(reopened.handle(), &handle);
        assert!(reopened.is_initialized().await);
    }
}
