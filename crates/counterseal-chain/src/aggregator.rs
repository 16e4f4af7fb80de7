//! Hash-chain commit protocol.
//!
//! The aggregator folds host records into batches and commits one tag per
//! batch through the ledger client. In [`Mode::Load`] it rebuilds the same
//! tags from replayed records without touching the ledger, and
//! [`Aggregator::verify_state`] then checks the rebuilt position against a
//! fresh verified read.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use counterseal_client::{LedgerClient, Transport};
use counterseal_core::{Receipt, SigningKeyPair, Tag};

use crate::batch::{batch_tag, verify_batch_tag, Batch, ChainMode};
use crate::error::{ChainError, Result};
use crate::record::LogRecord;

/// Whether finalized batches are sent to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Commit every finalized batch.
    Live,
    /// Replay: finalize locally only.
    Load,
}

/// Configuration for batch cadence and tag shape.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Records per batch. Zero is treated as one.
    pub batch_size: usize,
    /// How consecutive digests relate.
    pub chain_mode: ChainMode,
    /// Append the client's signature to each batch tag.
    pub sign_tags: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            chain_mode: ChainMode::CounterBound,
            sign_tags: true,
        }
    }
}

/// A finalized batch or recorded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Counter the tag was committed at.
    pub counter: u64,
    pub tag: Tag,
    /// The ledger's receipt; `None` in load mode.
    pub receipt: Option<Receipt>,
}

struct Inner {
    batch: Batch,
    mode: Mode,
    /// Whether the previous tag came from a finalized batch.
    previous_from_batch: bool,
    /// `(local, ledger)` counters of a detected divergence. Never cleared.
    divergent: Option<(u64, u64)>,
}

impl Inner {
    fn ensure_consistent(&self) -> Result<()> {
        match self.divergent {
            Some((local_counter, ledger_counter)) => Err(ChainError::DivergenceDetected {
                local_counter,
                ledger_counter,
                reason: "aggregator is divergent",
            }),
            None => Ok(()),
        }
    }
}

/// Batches records into ledger commits.
pub struct Aggregator<T: Transport> {
    client: Arc<LedgerClient<T>>,
    signer: Option<Arc<SigningKeyPair>>,
    config: AggregatorConfig,
    inner: Mutex<Inner>,
}

impl<T: Transport> Aggregator<T> {
    /// Start in live mode after a snapshot committed at `(base_counter, base_tag)`.
    pub fn new(
        client: Arc<LedgerClient<T>>,
        config: AggregatorConfig,
        base_counter: u64,
        base_tag: Tag,
    ) -> Self {
        let batch = Batch::new(base_counter, base_tag, config.chain_mode);
        Self {
            client,
            signer: None,
            config,
            inner: Mutex::new(Inner {
                batch,
                mode: Mode::Live,
                previous_from_batch: false,
                divergent: None,
            }),
        }
    }

    /// Sign batch tags with `signer`.
    pub fn with_signer(mut self, signer: Arc<SigningKeyPair>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn client(&self) -> &Arc<LedgerClient<T>> {
        &self.client
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    fn tag_signer(&self) -> Option<&SigningKeyPair> {
        if !self.config.sign_tags {
            return None;
        }
        self.signer.as_deref().filter(|signer| signer.can_sign())
    }

    /// Absorb a record, finalizing the batch when it is full or the record
    /// is a flush boundary.
    ///
    /// Returns the commit when one happened.
    pub async fn add<R: LogRecord + ?Sized>(&self, record: &R) -> Result<Option<Commit>> {
        let mut inner = self.inner.lock().await;
        inner.ensure_consistent()?;
        inner.batch.absorb(record)?;
        debug!(
            opcode = record.opcode(),
            pending = inner.batch.record_count(),
            "absorbed record"
        );

        let full = inner.batch.record_count() >= self.config.batch_size.max(1);
        if record.is_flush() || full {
            if record.is_flush() {
                debug!("flush record closes batch");
            }
            return self.finalize(&mut inner).await.map(Some);
        }
        Ok(None)
    }

    /// Finalize pending records, if any.
    pub async fn flush(&self) -> Result<Option<Commit>> {
        let mut inner = self.inner.lock().await;
        if inner.batch.is_empty() {
            return Ok(None);
        }
        info!(pending = inner.batch.record_count(), "flushing pending records");
        self.finalize(&mut inner).await.map(Some)
    }

    async fn finalize(&self, inner: &mut Inner) -> Result<Commit> {
        inner.ensure_consistent()?;
        let counter = inner.batch.sequence_number();
        let digest = inner.batch.seal();
        let tag = batch_tag(&digest, self.tag_signer())?;

        // Nothing advances unless the ledger verifiably accepted the tag.
        let receipt = match inner.mode {
            Mode::Live => Some(self.client.increment_counter(tag.clone(), counter).await?),
            Mode::Load => None,
        };

        debug!(
            counter,
            records = inner.batch.record_count(),
            mode = ?inner.mode,
            digest = ?digest,
            "finalized batch"
        );
        inner.batch.advance(tag.clone());
        inner.previous_from_batch = true;

        Ok(Commit {
            counter,
            tag,
            receipt,
        })
    }

    /// Commit a snapshot's content-bound tag.
    ///
    /// Fails with [`ChainError::PendingRecords`] before any network call when
    /// records are still pending.
    pub async fn record_image(&self, tag: Tag) -> Result<Commit> {
        let mut inner = self.inner.lock().await;
        inner.ensure_consistent()?;
        let pending = inner.batch.record_count();
        if pending > 0 {
            return Err(ChainError::PendingRecords { count: pending });
        }

        let counter = inner.batch.sequence_number();
        let receipt = match inner.mode {
            Mode::Live => Some(self.client.increment_counter(tag.clone(), counter).await?),
            Mode::Load => None,
        };

        debug!(counter, "recorded image");
        inner.batch.advance_image(tag.clone());
        inner.previous_from_batch = false;

        Ok(Commit {
            counter,
            tag,
            receipt,
        })
    }

    /// Compare the rebuilt `(counter, tag)` with a fresh verified read.
    ///
    /// The batch bookkeeping is not modified on mismatch, but the aggregator
    /// and its client become divergent and refuse every later commit.
    /// Pending records cannot be checked and are only reported.
    pub async fn verify_state(&self) -> Result<Receipt> {
        let mut inner = self.inner.lock().await;
        inner.ensure_consistent()?;
        let latest = self.client.read_latest().await?;

        let local_counter = inner.batch.sequence_number() - 1;
        if latest.counter() != local_counter {
            error!(local_counter, ledger_counter = latest.counter(), "counter mismatch");
            return Err(self
                .diverged(&mut inner, local_counter, latest.counter(), "counter mismatch")
                .await);
        }

        let pending = inner.batch.record_count();
        if pending > 0 {
            warn!(pending, "trailing records cannot be verified, likely an unclean shutdown");
        }

        if latest.tag() != inner.batch.previous_tag() {
            error!(counter = local_counter, "tag mismatch");
            return Err(self
                .diverged(&mut inner, local_counter, latest.counter(), "tag mismatch")
                .await);
        }

        if inner.previous_from_batch {
            if let Some(signer) = self.tag_signer() {
                if !verify_batch_tag(latest.tag(), signer) {
                    error!(counter = local_counter, "batch tag signature does not verify");
                    return Err(ChainError::UntrustedResponse(format!(
                        "batch tag at counter {local_counter} carries an invalid client signature"
                    )));
                }
            }
        }

        debug!(counter = local_counter, "state verified");
        Ok(latest)
    }

    async fn diverged(
        &self,
        inner: &mut Inner,
        local_counter: u64,
        ledger_counter: u64,
        reason: &'static str,
    ) -> ChainError {
        inner.divergent = Some((local_counter, ledger_counter));
        self.client.mark_divergent(ledger_counter).await;
        ChainError::DivergenceDetected {
            local_counter,
            ledger_counter,
            reason,
        }
    }

    /// Whether a divergence has been detected.
    pub async fn is_divergent(&self) -> bool {
        self.inner.lock().await.divergent.is_some()
    }

    /// Replay without committing.
    pub async fn load_mode(&self) {
        let mut inner = self.inner.lock().await;
        info!(counter = inner.batch.sequence_number() - 1, "load mode");
        inner.mode = Mode::Load;
    }

    /// Commit every finalized batch.
    pub async fn live_mode(&self) {
        let mut inner = self.inner.lock().await;
        info!(counter = inner.batch.sequence_number() - 1, "live mode");
        inner.mode = Mode::Live;
    }

    pub async fn mode(&self) -> Mode {
        self.inner.lock().await.mode
    }

    /// Last committed (or, in load mode, rebuilt) `(counter, tag)`.
    pub async fn latest(&self) -> (u64, Tag) {
        let inner = self.inner.lock().await;
        (
            inner.batch.sequence_number() - 1,
            inner.batch.previous_tag().clone(),
        )
    }

    /// Counter the next commit will produce.
    pub async fn expected_counter(&self) -> u64 {
        self.inner.lock().await.batch.sequence_number()
    }

    pub async fn pending_records(&self) -> usize {
        self.inner.lock().await.batch.record_count()
    }
}
