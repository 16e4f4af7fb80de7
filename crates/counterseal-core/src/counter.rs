//! Cached view of one ledger counter.

use serde::{Deserialize, Serialize};

use crate::crypto::RawSignature;
use crate::types::Tag;

/// What the client currently knows about its counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterStatus {
    /// Never created, or the outcome of the last mutation is unknown.
    /// A verified read is required before the value can be trusted.
    Uninitialized,

    /// Last verified counter value.
    Known(u64),

    /// Local and ledger state disagree. Terminal until rebuilt.
    Divergent { local: Option<u64>, ledger: u64 },
}

/// Counter status together with the tag and signature that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterState {
    status: CounterStatus,
    tag: Tag,
    signature: Option<RawSignature>,
}

impl CounterState {
    pub fn new() -> Self {
        Self {
            status: CounterStatus::Uninitialized,
            tag: Tag::empty(),
            signature: None,
        }
    }

    pub fn status(&self) -> CounterStatus {
        self.status
    }

    /// The verified counter, if known.
    pub fn counter(&self) -> Option<u64> {
        match self.status {
            CounterStatus::Known(counter) => Some(counter),
            _ => None,
        }
    }

    /// Tag stored at the known counter.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn signature(&self) -> Option<&RawSignature> {
        self.signature.as_ref()
    }

    pub fn is_known(&self) -> bool {
        matches!(self.status, CounterStatus::Known(_))
    }

    pub fn is_divergent(&self) -> bool {
        matches!(self.status, CounterStatus::Divergent { .. })
    }

    /// Counter the next increment must produce.
    pub fn expected_counter(&self) -> Option<u64> {
        self.counter().map(|c| c + 1)
    }

    /// Record a verified `(counter, tag)`. Ignored once divergent.
    pub fn record(&mut self, counter: u64, tag: Tag, signature: RawSignature) {
        if self.is_divergent() {
            return;
        }
        self.status = CounterStatus::Known(counter);
        self.tag = tag;
        self.signature = Some(signature);
    }

    /// Forget the cached value after an outcome-unknown failure.
    pub fn mark_unknown(&mut self) {
        if self.is_divergent() {
            return;
        }
        self.status = CounterStatus::Uninitialized;
        self.tag = Tag::empty();
        self.signature = None;
    }

    /// Enter the terminal divergent state.
    pub fn mark_divergent(&mut self, ledger: u64) {
        if self.is_divergent() {
            return;
        }
        self.status = CounterStatus::Divergent {
            local: self.counter(),
            ledger,
        };
    }
}

impl Default for CounterState {
    fn default() -> Self {
        Self::new()
    }
}
