//! Ledger operations and their verified results.

use bytes::Bytes;

use crate::canonical::{canonical_bytes, canonical_message, MessageType};
use crate::crypto::RawSignature;
use crate::identity::ServiceIdentity;
use crate::types::{Handle, Nonce, Tag};

/// The signable content of one ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create a counter at 0 holding `tag`.
    NewCounter { tag: Tag },

    /// Append `tag`, producing `expected_counter`.
    IncrementCounter { tag: Tag, expected_counter: u64 },

    /// The latest `(counter, tag)` as reported for a read with `nonce`.
    ReadLatest { counter: u64, tag: Tag, nonce: Nonce },
}

impl Operation {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::NewCounter { .. } => MessageType::NewCounter,
            Self::IncrementCounter { .. } => MessageType::IncrementCounter,
            Self::ReadLatest { .. } => MessageType::ReadLatest,
        }
    }

    /// Counter value bound by the signature.
    pub fn counter(&self) -> u64 {
        match self {
            Self::NewCounter { .. } => 0,
            Self::IncrementCounter {
                expected_counter, ..
            } => *expected_counter,
            Self::ReadLatest { counter, .. } => *counter,
        }
    }

    pub fn tag(&self) -> &Tag {
        match self {
            Self::NewCounter { tag }
            | Self::IncrementCounter { tag, .. }
            | Self::ReadLatest { tag, .. } => tag,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewCounter { .. } => "new_counter",
            Self::IncrementCounter { .. } => "increment_counter",
            Self::ReadLatest { .. } => "read_latest",
        }
    }
}

/// An operation resolved by the ledger, with the signature it returned.
///
/// Carries the identity and handle needed to rebuild the canonical message,
/// so a receipt can be re-verified at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub identity: Bytes,
    pub handle: Handle,
    pub operation: Operation,
    pub signature: RawSignature,
}

impl Receipt {
    pub fn new(
        identity: impl Into<Bytes>,
        handle: Handle,
        operation: Operation,
        signature: RawSignature,
    ) -> Self {
        Self {
            identity: identity.into(),
            handle,
            operation,
            signature,
        }
    }

    pub fn counter(&self) -> u64 {
        self.operation.counter()
    }

    pub fn tag(&self) -> &Tag {
        self.operation.tag()
    }

    /// The exact string the ledger signed.
    pub fn canonical_message(&self) -> String {
        canonical_message(&self.identity, &self.handle, &self.operation)
    }

    /// Check the signature against `service`'s key.
    pub fn verify(&self, service: &ServiceIdentity) -> bool {
        let message = canonical_bytes(&self.identity, &self.handle, &self.operation);
        service.verify(&message, &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{PublicKeyFormat, SigningKeyPair};

    fn service(pair: &SigningKeyPair) -> ServiceIdentity {
        ServiceIdentity::from_parts(
            &b"ledger"[..],
            pair.public_key_bytes().unwrap(),
            PublicKeyFormat::Compressed,
        )
        .unwrap()
    }

    fn signed(pair: &SigningKeyPair, operation: Operation) -> Receipt {
        let handle = Handle::from_bytes([3; 16]);
        let message = canonical_bytes(b"ledger", &handle, &operation);
        let signature = pair.sign(&message).unwrap();
        Receipt::new(&b"ledger"[..], handle, operation, signature)
    }

    #[test]
    fn test_receipt_verifies() {
        let pair = SigningKeyPair::generate();
        let receipt = signed(
            &pair,
            Operation::IncrementCounter {
                tag: Tag::from("tag_1"),
                expected_counter: 1,
            },
        );
        assert!(receipt.verify(&service(&pair)));
        assert_eq!(receipt.counter(), 1);
    }

    #[test]
    fn test_receipt_with_other_counter_fails() {
        let pair = SigningKeyPair::generate();
        let mut receipt = signed(
            &pair,
            Operation::IncrementCounter {
                tag: Tag::from("tag_1"),
                expected_counter: 1,
            },
        );
        receipt.operation = Operation::IncrementCounter {
            tag: Tag::from("tag_1"),
            expected_counter: 2,
        };
        assert!(!receipt.verify(&service(&pair)));
    }

    #[test]
    fn test_read_receipt_bound_to_nonce() {
        let pair = SigningKeyPair::generate();
        let receipt = signed(
            &pair,
            Operation::ReadLatest {
                counter: 4,
                tag: Tag::from("t"),
                nonce: Nonce::random(),
            },
        );
        assert!(receipt.verify(&service(&pair)));

        let mut replayed = receipt.clone();
        replayed.operation = Operation::ReadLatest {
            counter: 4,
            tag: Tag::from("t"),
            nonce: Nonce::random(),
        };
        assert!(!replayed.verify(&service(&pair)));
    }

    #[test]
    fn test_new_counter_is_zero() {
        let op = Operation::NewCounter { tag: Tag::empty() };
        assert_eq!(op.counter(), 0);
        assert_eq!(op.message_type(), MessageType::NewCounter);
        assert_eq!(op.name(), "new_counter");
    }
}
