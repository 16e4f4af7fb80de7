//! Strong type definitions for Counterseal.
//!
//! Handles, nonces and tags are newtypes so they cannot be swapped for one
//! another at call sites that all take bytes.

use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{decode_field, encode_field};
use crate::error::CoreError;

/// Length of a ledger handle in bytes.
pub const HANDLE_LEN: usize = 16;

/// Length of a read nonce in bytes.
pub const NONCE_LEN: usize = 16;

/// Opaque 16-byte identifier naming one counter on the ledger.
///
/// Generated once per logical log and persisted. Never reused after the
/// counter behind it has been created.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(pub [u8; HANDLE_LEN]);

impl Handle {
    /// Draw a fresh random handle.
    pub fn random() -> Self {
        let mut bytes = [0u8; HANDLE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; HANDLE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; HANDLE_LEN] {
        &self.0
    }

    /// URL-safe base64 form, as used in ledger paths.
    pub fn to_base64(&self) -> String {
        encode_field(&self.0)
    }

    /// Parse from the URL-safe base64 form.
    pub fn from_base64(s: &str) -> Result<Self, CoreError> {
        Self::try_from(decode_field(s)?.as_slice())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.to_base64())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl AsRef<[u8]> for Handle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Handle {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; HANDLE_LEN] = slice
            .try_into()
            .map_err(|_| CoreError::InvalidHandle(slice.len()))?;
        Ok(Self(arr))
    }
}

/// Client-chosen freshness value sent with every read.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl Nonce {
    /// Draw a fresh random nonce. Each read uses its own.
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        encode_field(&self.0)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.to_base64())
    }
}

impl AsRef<[u8]> for Nonce {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Nonce {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; NONCE_LEN] = slice
            .try_into()
            .map_err(|_| CoreError::InvalidNonce(slice.len()))?;
        Ok(Self(arr))
    }
}

/// Caller-chosen bytes bound to a counter value by the ledger's signature.
///
/// For log batches this is a digest of the batched records (optionally
/// followed by the client's signature over it); for snapshots it is a
/// content-bound checksum tag.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tag(pub Bytes);

impl Tag {
    /// Create from anything convertible to bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The empty tag.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// URL-safe base64 form.
    pub fn to_base64(&self) -> String {
        encode_field(&self.0)
    }

    /// Parse from the URL-safe base64 form.
    pub fn from_base64(s: &str) -> Result<Self, CoreError> {
        Ok(Self(Bytes::from(decode_field(s)?)))
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.to_base64())
    }
}

impl AsRef<[u8]> for Tag {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Tag {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Tag {
    fn from(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for Tag {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_base64_roundtrip() {
        let handle = Handle::random();
        let recovered = Handle::from_base64(&handle.to_base64()).unwrap();
        assert_eq!(handle, recovered);
    }

    #[test]
    fn test_handle_rejects_wrong_length() {
        let err = Handle::try_from(&[0u8; 15][..]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidHandle(15)));
    }

    #[test]
    fn test_random_handles_differ() {
        assert_ne!(Handle::random(), Handle::random());
        assert_ne!(Nonce::random(), Nonce::random());
    }

    #[test]
    fn test_tag_display_forms() {
        let tag = Tag::from("tag_1");
        assert_eq!(tag.to_base64(), "dGFnXzE");
        assert_eq!(format!("{:?}", tag), "Tag(dGFnXzE)");
        assert_eq!(Tag::from_base64("dGFnXzE").unwrap(), tag);
    }
}
