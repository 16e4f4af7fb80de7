//! The ledger's published identity.

use bytes::Bytes;
use std::fmt;

use crate::canonical::encode_field;
use crate::crypto::{parse_public_key, PublicKeyFormat, RawSignature, VerificationKey};
use crate::error::CoreError;

/// Identity and public key of one ledger instance.
///
/// Immutable once fetched. Every signed response from the ledger is checked
/// against [`verification_key`](Self::verification_key).
#[derive(Clone)]
pub struct ServiceIdentity {
    identity: Bytes,
    public_key: Bytes,
    key: VerificationKey,
}

impl ServiceIdentity {
    /// Build from the bytes the ledger publishes.
    ///
    /// The public key is parsed immediately so a bad point is rejected here
    /// rather than on the first verification.
    pub fn from_parts(
        identity: impl Into<Bytes>,
        public_key: impl Into<Bytes>,
        format: PublicKeyFormat,
    ) -> Result<Self, CoreError> {
        let public_key = public_key.into();
        let key = parse_public_key(&public_key, format)?;
        Ok(Self {
            identity: identity.into(),
            public_key,
            key,
        })
    }

    /// Opaque service name.
    pub fn identity(&self) -> &[u8] {
        &self.identity
    }

    /// Public key bytes exactly as published.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn verification_key(&self) -> &VerificationKey {
        &self.key
    }

    /// Check a ledger signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &RawSignature) -> bool {
        self.key.verify(message, signature)
    }

    /// Whether `other` names the same ledger with the same key.
    ///
    /// Keys are compared as curve points, so a compressed and a raw encoding
    /// of one key match.
    pub fn same_service(&self, other: &ServiceIdentity) -> bool {
        self.identity == other.identity && self.key == other.key
    }
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("identity", &encode_field(&self.identity))
            .field("key", &self.key)
            .finish()
    }
}
