//! Session configuration.

use serde::{Deserialize, Serialize};

use counterseal_chain::{AggregatorConfig, ChainMode};
use counterseal_client::{HttpTransport, TransportError, DEFAULT_ENDPOINT};
use counterseal_core::PublicKeyFormat;

/// Configuration for a [`Session`](crate::Session).
///
/// Deserializes from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    /// Ledger base URL.
    pub endpoint: String,
    /// Records per committed batch.
    pub batch_size: usize,
    /// Public key encoding requested from `/serviceid`.
    pub public_key_format: PublicKeyFormat,
    pub chain_mode: ChainMode,
    /// Sign batch and snapshot tags with the client key.
    pub sign_tags: bool,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            batch_size: 2,
            public_key_format: PublicKeyFormat::Compressed,
            chain_mode: ChainMode::CounterBound,
            sign_tags: true,
        }
    }
}

impl SealConfig {
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            batch_size: self.batch_size,
            chain_mode: self.chain_mode,
            sign_tags: self.sign_tags,
        }
    }

    /// HTTP transport to [`endpoint`](Self::endpoint).
    pub fn http_transport(&self) -> Result<HttpTransport, TransportError> {
        HttpTransport::new(&self.endpoint)
    }
}
