//! Cryptographic primitives for Counterseal.
//!
//! The ledger signs with ECDSA over NIST P-256 (secp256r1) and SHA-256, and
//! ships signatures as raw fixed-width `r || s`. Verification primitives want
//! the ASN.1 integer-pair encoding instead, so this module carries the codec
//! between the two. Batch digests use Blake3.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Width of one signature scalar in bytes.
pub const SCALAR_LEN: usize = 32;

/// Width of a raw `r || s` signature in bytes.
pub const RAW_SIGNATURE_LEN: usize = 2 * SCALAR_LEN;

/// A 32-byte Blake3 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Blake3Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<blake3::Hash> for Blake3Hash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

/// A raw ECDSA signature: big-endian unsigned `r` followed by `s`, no ASN.1.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawSignature(pub [u8; RAW_SIGNATURE_LEN]);

impl RawSignature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; RAW_SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; RAW_SIGNATURE_LEN] {
        &self.0
    }

    /// The `r` half.
    pub fn r(&self) -> &[u8] {
        &self.0[..SCALAR_LEN]
    }

    /// The `s` half.
    pub fn s(&self) -> &[u8] {
        &self.0[SCALAR_LEN..]
    }

    /// Re-encode as an ASN.1 `SEQUENCE { INTEGER r, INTEGER s }`.
    ///
    /// Each scalar is written as a minimal-length signed big-endian integer:
    /// leading zero bytes are dropped and a single `0x00` is prepended when
    /// the top bit of the first remaining byte is set.
    pub fn to_der(&self) -> Vec<u8> {
        let r = der_integer(self.r());
        let s = der_integer(self.s());

        let mut der = Vec::with_capacity(6 + r.len() + s.len());
        der.push(0x30);
        der.push((4 + r.len() + s.len()) as u8);
        der.push(0x02);
        der.push(r.len() as u8);
        der.extend_from_slice(&r);
        der.push(0x02);
        der.push(s.len() as u8);
        der.extend_from_slice(&s);
        der
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The zero signature (never valid, used as placeholder).
    pub const ZERO: Self = Self([0u8; RAW_SIGNATURE_LEN]);
}

impl TryFrom<&[u8]> for RawSignature {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; RAW_SIGNATURE_LEN] = slice
            .try_into()
            .map_err(|_| CoreError::InvalidSignatureLength(slice.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for RawSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawSig({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for RawSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Minimal signed big-endian encoding of an unsigned big-endian integer.
fn der_integer(unsigned: &[u8]) -> Vec<u8> {
    let start = unsigned
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(unsigned.len() - 1);
    let trimmed = &unsigned[start..];

    let mut out = Vec::with_capacity(trimmed.len() + 1);
    if trimmed[0] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(trimmed);
    out
}

/// How a ledger public key is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicKeyFormat {
    /// 64 bytes: X || Y, no SEC1 prefix.
    Raw,
    /// 33 bytes: SEC1 compressed point.
    Compressed,
    /// 65 bytes: SEC1 uncompressed point (`0x04 || X || Y`).
    Uncompressed,
    /// Pick one of the above by length.
    Auto,
}

impl PublicKeyFormat {
    fn detect(len: usize) -> Option<Self> {
        match len {
            64 => Some(Self::Raw),
            33 => Some(Self::Compressed),
            65 => Some(Self::Uncompressed),
            _ => None,
        }
    }

    fn expected_len(self) -> usize {
        match self {
            Self::Raw => 64,
            Self::Compressed => 33,
            Self::Uncompressed | Self::Auto => 65,
        }
    }
}

/// A P-256 public key used to check ECDSA signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationKey {
    key: VerifyingKey,
}

impl VerificationKey {
    /// Verify a raw `r || s` signature over `message`.
    ///
    /// Returns `false` for any signature that does not match, including
    /// scalars the backend refuses outright (zero, or not below the group
    /// order). Never errors.
    pub fn verify(&self, message: &[u8], signature: &RawSignature) -> bool {
        let der = signature.to_der();
        let Ok(sig) = Signature::from_der(&der) else {
            return false;
        };
        self.key.verify(message, &sig).is_ok()
    }

    /// SEC1 compressed encoding (33 bytes).
    pub fn to_compressed(&self) -> Vec<u8> {
        self.key.to_encoded_point(true).as_bytes().to_vec()
    }

    /// SEC1 uncompressed encoding (65 bytes).
    pub fn to_uncompressed(&self) -> Vec<u8> {
        self.key.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Raw X || Y encoding (64 bytes).
    pub fn to_raw(&self) -> Vec<u8> {
        self.key.to_encoded_point(false).as_bytes()[1..].to_vec()
    }

    /// Access the underlying p256 key.
    pub fn inner(&self) -> &VerifyingKey {
        &self.key
    }
}

impl From<VerifyingKey> for VerificationKey {
    fn from(key: VerifyingKey) -> Self {
        Self { key }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P256Pub({})", &hex::encode(self.to_compressed())[..18])
    }
}

/// Decode a P-256 point from `bytes` laid out as `format`.
///
/// Fails with [`CoreError::InvalidKeyData`] when the length does not match
/// the format or the point is not on the curve.
pub fn parse_public_key(bytes: &[u8], format: PublicKeyFormat) -> Result<VerificationKey, CoreError> {
    let format = match format {
        PublicKeyFormat::Auto => PublicKeyFormat::detect(bytes.len()).ok_or_else(|| {
            CoreError::InvalidKeyData(format!("unrecognised public key length {}", bytes.len()))
        })?,
        other => other,
    };

    if bytes.len() != format.expected_len() {
        return Err(CoreError::InvalidKeyData(format!(
            "{:?} public key must be {} bytes, got {}",
            format,
            format.expected_len(),
            bytes.len()
        )));
    }

    let key = match format {
        PublicKeyFormat::Raw => {
            let mut sec1 = Vec::with_capacity(65);
            sec1.push(0x04);
            sec1.extend_from_slice(bytes);
            VerifyingKey::from_sec1_bytes(&sec1)
        }
        _ => VerifyingKey::from_sec1_bytes(bytes),
    }
    .map_err(|_| CoreError::InvalidKeyData("point is not on P-256".into()))?;

    Ok(VerificationKey { key })
}

/// Verify a raw signature with `key`. See [`VerificationKey::verify`].
pub fn verify(key: &VerificationKey, signature: &RawSignature, message: &[u8]) -> bool {
    key.verify(message, signature)
}

/// Sign `message` with ECDSA/SHA-256, returning the raw `r || s` form.
///
/// Nonces are derived per RFC 6979, so the same key and message always
/// yield the same signature.
pub fn sign(private_key: &SigningKey, message: &[u8]) -> Result<RawSignature, CoreError> {
    let sig: Signature = private_key
        .try_sign(message)
        .map_err(|e| CoreError::CryptoFailure(e.to_string()))?;
    RawSignature::try_from(sig.to_bytes().as_slice())
}

/// The client-held key pair used to sign tags.
///
/// Either half may be missing after a partial load; only a pair with both
/// halves [`can_sign`](Self::can_sign).
#[derive(Clone)]
pub struct SigningKeyPair {
    public: Option<VerificationKey>,
    private: Option<SigningKey>,
}

impl SigningKeyPair {
    /// Generate a fresh pair from OS randomness.
    pub fn generate() -> Self {
        let private = SigningKey::random(&mut rand::rngs::OsRng);
        let public = VerificationKey::from(private.verifying_key().clone());
        Self {
            public: Some(public),
            private: Some(private),
        }
    }

    /// Rebuild from persisted halves.
    ///
    /// `public` is a SEC1 point (any format [`PublicKeyFormat::Auto`]
    /// accepts); `private` is the 32-byte big-endian scalar. When both are
    /// present they must belong together.
    pub fn from_parts(public: Option<&[u8]>, private: Option<&[u8]>) -> Result<Self, CoreError> {
        let public = public
            .map(|bytes| parse_public_key(bytes, PublicKeyFormat::Auto))
            .transpose()?;
        let private = private
            .map(|bytes| {
                SigningKey::from_slice(bytes)
                    .map_err(|_| CoreError::InvalidKeyData("invalid P-256 private scalar".into()))
            })
            .transpose()?;

        if let (Some(public), Some(private)) = (&public, &private) {
            if public.inner() != private.verifying_key() {
                return Err(CoreError::InvalidKeyData(
                    "signing public key does not match private key".into(),
                ));
            }
        }

        Ok(Self { public, private })
    }

    /// A pair with neither half.
    pub fn empty() -> Self {
        Self {
            public: None,
            private: None,
        }
    }

    /// Whether both halves are present.
    pub fn can_sign(&self) -> bool {
        self.public.is_some() && self.private.is_some()
    }

    pub fn public_key(&self) -> Option<&VerificationKey> {
        self.public.as_ref()
    }

    /// Compressed SEC1 bytes of the public half, for persistence.
    pub fn public_key_bytes(&self) -> Option<Vec<u8>> {
        self.public.as_ref().map(VerificationKey::to_compressed)
    }

    /// Raw scalar bytes of the private half, for persistence.
    pub fn private_key_bytes(&self) -> Option<Vec<u8>> {
        self.private.as_ref().map(|key| key.to_bytes().to_vec())
    }

    /// Sign `message` with the private half.
    pub fn sign(&self, message: &[u8]) -> Result<RawSignature, CoreError> {
        let private = self.private.as_ref().ok_or(CoreError::MissingPrivateKey)?;
        sign(private, message)
    }

    /// Verify `signature` with the public half.
    ///
    /// Returns `false` when there is no public half.
    pub fn verify(&self, message: &[u8], signature: &RawSignature) -> bool {
        self.public
            .as_ref()
            .map(|key| key.verify(message, signature))
            .unwrap_or(false)
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &self.public)
            .field("private", &self.private.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Generate a fresh client signing key pair.
pub fn generate_signing_key_pair() -> SigningKeyPair {
    SigningKeyPair::generate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn raw_from(r: [u8; 32], s: [u8; 32]) -> RawSignature {
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&r);
        raw[32..].copy_from_slice(&s);
        RawSignature(raw)
    }

    #[test]
    fn test_sign_verify() {
        let pair = SigningKeyPair::generate();
        let message = b"hello world";
        let signature = pair.sign(message).unwrap();

        assert!(pair.verify(message, &signature));
        assert!(!pair.verify(b"hello worlD", &signature));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let pair = SigningKeyPair::generate();
        let a = pair.sign(b"same message").unwrap();
        let b = pair.sign(b"same message").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_der_without_sign_padding() {
        let sig = raw_from([0x11; 32], [0x22; 32]);
        let der = sig.to_der();
        assert_eq!(der.len(), 70);
        assert_eq!(&der[..4], &[0x30, 68, 0x02, 32]);
        assert_eq!(der[4], 0x11);
        assert_eq!(&der[36..38], &[0x02, 32]);
    }

    #[test]
    fn test_der_with_sign_padding() {
        let sig = raw_from([0x80; 32], [0xff; 32]);
        let der = sig.to_der();
        assert_eq!(der.len(), 72);
        assert_eq!(&der[..5], &[0x30, 70, 0x02, 33, 0x00]);
        assert_eq!(der[5], 0x80);
        assert_eq!(&der[37..40], &[0x02, 33, 0x00]);
    }

    #[test]
    fn test_der_strips_leading_zeros() {
        let mut r = [0u8; 32];
        r[2] = 0x05;
        r[31] = 0x01;
        let mut s = [0u8; 32];
        s[1] = 0x90;
        let der = raw_from(r, s).to_der();

        // r: 30 bytes starting at 0x05; s: 0x00 pad + 31 bytes starting at 0x90
        assert_eq!(der[2..4], [0x02, 30]);
        assert_eq!(der[4], 0x05);
        assert_eq!(der[34..37], [0x02, 32, 0x00]);
        assert_eq!(der[37], 0x90);
        assert_eq!(der[1] as usize, der.len() - 2);
    }

    #[test]
    fn test_der_zero_scalar_is_single_byte() {
        let der = RawSignature::ZERO.to_der();
        assert_eq!(der, vec![0x30, 6, 0x02, 1, 0x00, 0x02, 1, 0x00]);
    }

    #[test]
    fn test_zero_signature_does_not_verify() {
        let pair = SigningKeyPair::generate();
        assert!(!pair.verify(b"message", &RawSignature::ZERO));
    }

    #[test]
    fn test_parse_public_key_formats() {
        let pair = SigningKeyPair::generate();
        let key = pair.public_key().unwrap();

        let compressed = key.to_compressed();
        let raw = key.to_raw();
        assert_eq!(compressed.len(), 33);
        assert_eq!(raw.len(), 64);

        let from_compressed = parse_public_key(&compressed, PublicKeyFormat::Compressed).unwrap();
        let from_raw = parse_public_key(&raw, PublicKeyFormat::Raw).unwrap();
        let from_auto = parse_public_key(&raw, PublicKeyFormat::Auto).unwrap();
        assert_eq!(&from_compressed, key);
        assert_eq!(&from_raw, key);
        assert_eq!(&from_auto, key);
    }

    #[test]
    fn test_parse_public_key_rejects_bad_input() {
        assert!(matches!(
            parse_public_key(&[0u8; 10], PublicKeyFormat::Auto),
            Err(CoreError::InvalidKeyData(_))
        ));
        assert!(matches!(
            parse_public_key(&[0u8; 33], PublicKeyFormat::Raw),
            Err(CoreError::InvalidKeyData(_))
        ));
        // (1, 1) is not on the curve
        let mut off_curve = [0u8; 64];
        off_curve[31] = 1;
        off_curve[63] = 1;
        assert!(matches!(
            parse_public_key(&off_curve, PublicKeyFormat::Raw),
            Err(CoreError::InvalidKeyData(_))
        ));
    }

    #[test]
    fn test_key_pair_persistence_roundtrip() {
        let pair = SigningKeyPair::generate();
        let public = pair.public_key_bytes().unwrap();
        let private = pair.private_key_bytes().unwrap();

        let restored = SigningKeyPair::from_parts(Some(&public), Some(&private)).unwrap();
        assert!(restored.can_sign());
        let sig = restored.sign(b"tag").unwrap();
        assert!(pair.verify(b"tag", &sig));
    }

    #[test]
    fn test_key_pair_mismatched_halves_rejected() {
        let a = SigningKeyPair::generate();
        let b = SigningKeyPair::generate();
        let result = SigningKeyPair::from_parts(
            a.public_key_bytes().as_deref(),
            b.private_key_bytes().as_deref(),
        );
        assert!(matches!(result, Err(CoreError::InvalidKeyData(_))));
    }

    #[test]
    fn test_partial_key_pair_cannot_sign() {
        let pair = SigningKeyPair::generate();
        let public_only =
            SigningKeyPair::from_parts(pair.public_key_bytes().as_deref(), None).unwrap();
        assert!(!public_only.can_sign());
        assert!(matches!(
            public_only.sign(b"x"),
            Err(CoreError::MissingPrivateKey)
        ));
        assert!(!SigningKeyPair::empty().can_sign());
    }

    proptest! {
        #[test]
        fn test_der_matches_reference_encoder(
            r in any::<[u8; 32]>(),
            s in any::<[u8; 32]>(),
            top_r in any::<bool>(),
            zeros in 0usize..4,
        ) {
            let mut r = r;
            // Exercise both sides of the sign-bit rule and short scalars.
            if top_r { r[0] |= 0x80 } else { r[0] &= 0x7f }
            for byte in r.iter_mut().take(zeros) {
                *byte = 0;
            }
            let raw = raw_from(r, s);
            let reference = Signature::from_slice(raw.as_bytes());
            prop_assume!(reference.is_ok());

            let reference_der = reference.unwrap().to_der();
            prop_assert_eq!(raw.to_der(), reference_der.as_bytes().to_vec());
        }

        #[test]
        fn test_verify_agrees_with_reference(message in proptest::collection::vec(any::<u8>(), 0..128)) {
            let signing = SigningKey::random(&mut rand::rngs::OsRng);
            let key = VerificationKey::from(signing.verifying_key().clone());
            let sig: Signature = signing.sign(&message);
            let raw = RawSignature::try_from(sig.to_bytes().as_slice()).unwrap();

            let reference = key.inner().verify(&message, &sig).is_ok();
            prop_assert_eq!(key.verify(&message, &raw), reference);
            prop_assert!(reference);

            let mut tampered = message.clone();
            tampered.push(0x00);
            let reference_tampered = key.inner().verify(&tampered, &sig).is_ok();
            prop_assert_eq!(key.verify(&tampered, &raw), reference_tampered);
        }
    }
}
