//! # Counterseal Chain
//!
//! Batching and hash-chained commits of host log records.
//!
//! ## Overview
//!
//! Records are folded into a running digest. When a batch is full, a flush
//! record arrives or [`Aggregator::flush`] is called, the digest is bound to
//! the counter it will produce and committed as the batch tag.
//!
//! ## Modes
//!
//! - **Live**: every finalized batch is committed through the ledger client
//! - **Load**: replayed records rebuild the same tags locally; afterwards
//!   [`Aggregator::verify_state`] checks the result against the ledger
//!
//! ## Usage
//!
//! ```rust,no_run
//! use counterseal_chain::{Aggregator, AggregatorConfig, RawRecord};
//!
//! // let aggregator = Aggregator::new(client, AggregatorConfig::default(), counter, tag);
//! // aggregator.add(&RawRecord::new(0x01, fields)).await?;
//! // aggregator.flush().await?;
//! ```

pub mod aggregator;
pub mod batch;
pub mod error;
pub mod record;

pub use aggregator::{Aggregator, AggregatorConfig, Commit, Mode};
pub use batch::{batch_tag, verify_batch_tag, Batch, ChainMode, DIGEST_LEN};
pub use error::{ChainError, Result};
pub use record::{LogRecord, RawRecord, FLUSH_OPCODE};
