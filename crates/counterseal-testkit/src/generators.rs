//! Proptest generators for property-based testing.

use proptest::prelude::*;

use counterseal_chain::RawRecord;
use counterseal_core::{
    Blake3Hash, Handle, Nonce, RawSignature, SigningKeyPair, Tag, HANDLE_LEN, NONCE_LEN,
};

/// Generate a random Handle.
pub fn handle() -> impl Strategy<Value = Handle> {
    any::<[u8; HANDLE_LEN]>().prop_map(Handle::from_bytes)
}

/// Generate a random Nonce.
pub fn nonce() -> impl Strategy<Value = Nonce> {
    any::<[u8; NONCE_LEN]>().prop_map(Nonce::from_bytes)
}

/// Generate a random Blake3Hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash)
}

/// Generate a tag of at most `max_len` bytes.
pub fn tag(max_len: usize) -> impl Strategy<Value = Tag> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Tag::from)
}

/// Generate raw `r || s` bytes, including scalars with the top bit set
/// and with leading zeros.
pub fn raw_signature() -> impl Strategy<Value = RawSignature> {
    (scalar_bytes(), scalar_bytes()).prop_map(|(r, s)| {
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&r);
        raw[32..].copy_from_slice(&s);
        RawSignature::from_bytes(raw)
    })
}

fn scalar_bytes() -> impl Strategy<Value = [u8; 32]> {
    prop_oneof![
        any::<[u8; 32]>(),
        any::<[u8; 32]>().prop_map(|mut s| {
            s[0] |= 0x80;
            s
        }),
        (any::<[u8; 32]>(), 1usize..32).prop_map(|(mut s, zeros)| {
            s[..zeros].fill(0);
            s
        }),
    ]
}

/// Generate a client signing key pair from a random scalar.
pub fn signing_key_pair() -> impl Strategy<Value = SigningKeyPair> {
    any::<[u8; 32]>().prop_filter_map("scalar out of range", |scalar| {
        SigningKeyPair::from_parts(None, Some(&scalar)).ok()
    })
}

/// Generate a host record with up to `max_len` bytes of fields.
///
/// Flush records are excluded.
pub fn raw_record(max_len: usize) -> impl Strategy<Value = RawRecord> {
    (0u8..0xFE, prop::collection::vec(any::<u8>(), 0..=max_len))
        .prop_map(|(opcode, fields)| RawRecord::new(opcode, fields))
}

/// Generate a host log of at most `max_records` records.
pub fn records(max_records: usize) -> impl Strategy<Value = Vec<RawRecord>> {
    prop::collection::vec(raw_record(64), 0..=max_records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterseal_chain::{Batch, ChainMode, LogRecord};

    proptest! {
        #[test]
        fn test_der_is_well_formed(signature in raw_signature()) {
            let der = signature.to_der();
            prop_assert_eq!(der[0], 0x30);
            prop_assert_eq!(der[1] as usize, der.len() - 2);
            // Each integer is positive and minimal.
            let r_len = der[3] as usize;
            prop_assert!(der[4] & 0x80 == 0);
            prop_assert!(r_len == 1 || der[4] != 0 || der[5] & 0x80 != 0);
        }

        #[test]
        fn test_generated_records_never_flush(records in records(32)) {
            prop_assert!(records.iter().all(|r| !r.is_flush()));
        }

        #[test]
        fn test_batch_digest_depends_on_records(a in records(8), b in records(8)) {
            prop_assume!(a != b);
            let mut left = Batch::new(0, Tag::empty(), ChainMode::CounterBound);
            let mut right = Batch::new(0, Tag::empty(), ChainMode::CounterBound);
            for record in &a {
                left.absorb(record).unwrap();
            }
            for record in &b {
                right.absorb(record).unwrap();
            }
            // Different record sequences can only collide when the encoded
            // byte streams coincide.
            let encode = |records: &[RawRecord]| -> Vec<u8> {
                records.iter().flat_map(|r| {
                    let mut bytes = vec![r.opcode()];
                    bytes.extend_from_slice(&r.fields);
                    bytes
                }).collect()
            };
            prop_assume!(encode(&a) != encode(&b));
            prop_assert_ne!(left.seal(), right.seal());
        }

        #[test]
        fn test_signing_keys_sign(pair in signing_key_pair(), message in prop::collection::vec(any::<u8>(), 0..64)) {
            let signature = pair.sign(&message).unwrap();
            prop_assert!(pair.verify(&message, &signature));
        }
    }
}
