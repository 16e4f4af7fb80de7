//! Batch accumulator and tag construction.
//!
//! A batch folds records into a running Blake3 digest. Finalizing absorbs
//! the decimal string of the counter the batch will produce, so each tag is
//! bound to its position in the ledger sequence.

use serde::{Deserialize, Serialize};

use counterseal_core::crypto::RAW_SIGNATURE_LEN;
use counterseal_core::{Blake3Hash, CoreError, RawSignature, SigningKeyPair, Tag};

use crate::record::LogRecord;

/// Length of a batch digest.
pub const DIGEST_LEN: usize = 32;

/// How consecutive batch digests relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChainMode {
    /// Each digest covers its own records and counter only.
    #[default]
    CounterBound,
    /// Legacy: each digest starts by absorbing the previous tag.
    Chained,
}

/// Mutable accumulator for the records of one pending commit.
#[derive(Debug, Clone)]
pub struct Batch {
    sequence_number: u64,
    record_count: usize,
    hasher: blake3::Hasher,
    previous_tag: Tag,
    chain_mode: ChainMode,
}

impl Batch {
    /// Start after a base snapshot committed at `(base_counter, base_tag)`.
    pub fn new(base_counter: u64, base_tag: Tag, chain_mode: ChainMode) -> Self {
        let hasher = fresh_hasher(chain_mode, &base_tag);
        Self {
            sequence_number: base_counter + 1,
            record_count: 0,
            hasher,
            previous_tag: base_tag,
            chain_mode,
        }
    }

    /// Counter this batch will produce.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Records absorbed since the last finalize.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Tag of the last committed counter.
    pub fn previous_tag(&self) -> &Tag {
        &self.previous_tag
    }

    pub fn chain_mode(&self) -> ChainMode {
        self.chain_mode
    }

    /// Fold a record in as its opcode byte followed by its fields.
    ///
    /// The record is serialized in full before anything reaches the digest,
    /// so a failing record leaves the batch as it was.
    pub fn absorb<R: LogRecord + ?Sized>(&mut self, record: &R) -> std::io::Result<()> {
        let mut encoded = vec![record.opcode()];
        record.write_fields(&mut encoded)?;
        self.hasher.update(&encoded);
        self.record_count += 1;
        Ok(())
    }

    /// Digest for the current records, bound to [`sequence_number`](Self::sequence_number).
    ///
    /// Does not consume the batch; sealing twice gives the same digest.
    pub fn seal(&self) -> Blake3Hash {
        let mut hasher = self.hasher.clone();
        hasher.update(self.sequence_number.to_string().as_bytes());
        hasher.finalize().into()
    }

    /// Commit succeeded with `tag`: start the next batch.
    pub fn advance(&mut self, tag: Tag) {
        self.hasher = fresh_hasher(self.chain_mode, &tag);
        self.previous_tag = tag;
        self.sequence_number += 1;
        self.record_count = 0;
    }

    /// A snapshot was committed with `tag` outside the batch path.
    ///
    /// The digest context is left as it is.
    pub fn advance_image(&mut self, tag: Tag) {
        self.previous_tag = tag;
        self.sequence_number += 1;
    }
}

fn fresh_hasher(chain_mode: ChainMode, previous_tag: &Tag) -> blake3::Hasher {
    let mut hasher = blake3::Hasher::new();
    if chain_mode == ChainMode::Chained {
        hasher.update(previous_tag.as_bytes());
    }
    hasher
}

/// Build the tag committed for `digest`.
///
/// With a signer this is `digest || signature(digest)`, otherwise the bare
/// digest. Signing is deterministic, so a replay rebuilds the same bytes.
pub fn batch_tag(digest: &Blake3Hash, signer: Option<&SigningKeyPair>) -> Result<Tag, CoreError> {
    let mut tag = digest.as_bytes().to_vec();
    if let Some(signer) = signer {
        let signature = signer.sign(digest.as_bytes())?;
        tag.extend_from_slice(signature.as_bytes());
    }
    Ok(Tag::from(tag))
}

/// Check the client signature embedded in a signed batch tag.
///
/// Returns `false` for tags of any other shape.
pub fn verify_batch_tag(tag: &Tag, signer: &SigningKeyPair) -> bool {
    if tag.len() != DIGEST_LEN + RAW_SIGNATURE_LEN {
        return false;
    }
    let (digest, signature) = tag.as_bytes().split_at(DIGEST_LEN);
    match RawSignature::try_from(signature) {
        Ok(signature) => signer.verify(digest, &signature),
        Err(_) => false,
    }
}
