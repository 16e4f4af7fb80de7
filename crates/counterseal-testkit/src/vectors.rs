//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical signed-message encoding, so any client
//! of the same ledger can check it produces byte-identical messages.

use serde::Serialize;

use counterseal_core::{canonical_message, decode_field, CoreError, Handle, Nonce, Operation, Tag};

/// Service identity shared by all vectors (base64url).
pub const VECTOR_IDENTITY: &str = "C9JtOpmXyBd-anyeBbhr5RZ0ac2urm5Nt-z_C88wfvU";

/// A golden test vector. Byte fields are base64url.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub handle: &'static str,
    /// `new_counter`, `increment_counter` or `read_latest`.
    pub operation: &'static str,
    /// Raw tag bytes, as text.
    pub tag: &'static str,
    /// Expected counter for increments, reported counter for reads.
    pub counter: u64,
    /// Read nonce; empty for other operations.
    pub nonce: &'static str,
    /// Expected canonical message.
    pub expected: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "NewCounter with text tag",
            handle: "U3qYAXnAaH97OpiRc1XTCA",
            operation: "new_counter",
            tag: "some-tag-value",
            counter: 0,
            nonce: "",
            expected: "AQAAAAAAAAA.C9JtOpmXyBd-anyeBbhr5RZ0ac2urm5Nt-z_C88wfvU.U3qYAXnAaH97OpiRc1XTCA.AAAAAAAAAAA.c29tZS10YWctdmFsdWU",
        },
        GoldenVector {
            name: "IncrementCounter to 1",
            handle: "HKL9dcyf4dsrhskxUHeF-g",
            operation: "increment_counter",
            tag: "tag_1",
            counter: 1,
            nonce: "",
            expected: "AwAAAAAAAAA.C9JtOpmXyBd-anyeBbhr5RZ0ac2urm5Nt-z_C88wfvU.HKL9dcyf4dsrhskxUHeF-g.AQAAAAAAAAA.dGFnXzE",
        },
        GoldenVector {
            name: "ReadLatest at 0",
            handle: "HKL9dcyf4dsrhskxUHeF-g",
            operation: "read_latest",
            tag: "some-tag-value",
            counter: 0,
            nonce: "Cl9crZbg3dwS9W30jT0j2A",
            expected: "BQAAAAAAAAA.C9JtOpmXyBd-anyeBbhr5RZ0ac2urm5Nt-z_C88wfvU.HKL9dcyf4dsrhskxUHeF-g.AAAAAAAAAAA.c29tZS10YWctdmFsdWU.Cl9crZbg3dwS9W30jT0j2A",
        },
    ]
}

/// Build the operation a vector describes.
pub fn operation_from_vector(vector: &GoldenVector) -> Result<Operation, CoreError> {
    let tag = Tag::from(vector.tag.as_bytes().to_vec());
    match vector.operation {
        "new_counter" => Ok(Operation::NewCounter { tag }),
        "increment_counter" => Ok(Operation::IncrementCounter {
            tag,
            expected_counter: vector.counter,
        }),
        "read_latest" => Ok(Operation::ReadLatest {
            counter: vector.counter,
            tag,
            nonce: Nonce::try_from(decode_field(vector.nonce)?.as_slice())?,
        }),
        other => Err(CoreError::DecodingError(format!("unknown operation {other:?}"))),
    }
}

/// Canonical message for a vector.
pub fn message_from_vector(vector: &GoldenVector) -> Result<String, CoreError> {
    let identity = decode_field(VECTOR_IDENTITY)?;
    let handle = Handle::from_base64(vector.handle)?;
    let operation = operation_from_vector(vector)?;
    Ok(canonical_message(&identity, &handle, &operation))
}

/// Check every vector against this implementation.
///
/// Returns `(name, matches, produced)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| match message_from_vector(v) {
            Ok(message) => (v.name.to_string(), message == v.expected, message),
            Err(e) => (v.name.to_string(), false, e.to_string()),
        })
        .collect()
}

/// The vectors as JSON, for other implementations.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}
