//! Canonical encoding of ledger operations.
//!
//! Every operation the ledger signs has exactly one textual form: its fields,
//! each URL-safe base64 without padding, joined by `.` in a fixed order.
//!
//! | Operation        | Fields                                                  |
//! |------------------|---------------------------------------------------------|
//! | NewCounter       | type=1, identity, handle, counter=0, tag                |
//! | IncrementCounter | type=3, identity, handle, expected counter, tag         |
//! | ReadLatest       | type=5, identity, handle, counter, tag, nonce           |
//!
//! Message types and counters are 8-byte little-endian integers. These
//! exact bytes are what the ledger signs, so any deviation in order,
//! endianness or padding breaks verification.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

use crate::error::CoreError;
use crate::operation::Operation;
use crate::types::Handle;

/// Separator between encoded fields.
pub const FIELD_SEPARATOR: char = '.';

/// Literal used for an absent optional field in persisted records.
pub const NULL_FIELD: &str = "null";

/// Unpadded URL-safe alphabet. Decoding also tolerates `=` padding, which
/// some ledger builds emit on responses.
const FIELD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Wire discriminator of a signed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum MessageType {
    NewCounter = 1,
    IncrementCounter = 3,
    ReadLatest = 5,
}

impl MessageType {
    pub const fn as_u64(self) -> u64 {
        self as u64
    }

    /// Little-endian wire form.
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.as_u64().to_le_bytes()
    }
}

/// Encode one field as unpadded URL-safe base64.
pub fn encode_field(bytes: &[u8]) -> String {
    FIELD_ENGINE.encode(bytes)
}

/// Decode one unpadded URL-safe base64 field.
pub fn decode_field(field: &str) -> Result<Vec<u8>, CoreError> {
    FIELD_ENGINE
        .decode(field)
        .map_err(|e| CoreError::DecodingError(format!("{field:?}: {e}")))
}

/// Encode an optional field, writing [`NULL_FIELD`] when absent.
pub fn encode_optional(bytes: Option<&[u8]>) -> String {
    match bytes {
        Some(bytes) => encode_field(bytes),
        None => NULL_FIELD.to_string(),
    }
}

/// Decode an optional field, mapping [`NULL_FIELD`] to `None`.
pub fn decode_optional(field: &str) -> Result<Option<Vec<u8>>, CoreError> {
    if field == NULL_FIELD {
        return Ok(None);
    }
    decode_field(field).map(Some)
}

/// Encode a counter as its 8-byte little-endian form.
pub fn encode_counter(counter: u64) -> String {
    encode_field(&counter.to_le_bytes())
}

/// Build the canonical message for `operation` on `(identity, handle)`.
pub fn canonical_message(identity: &[u8], handle: &Handle, operation: &Operation) -> String {
    let mut fields = vec![
        encode_field(&operation.message_type().to_le_bytes()),
        encode_field(identity),
        handle.to_base64(),
        encode_counter(operation.counter()),
        operation.tag().to_base64(),
    ];

    if let Operation::ReadLatest { nonce, .. } = operation {
        fields.push(nonce.to_base64());
    }

    fields.join(&FIELD_SEPARATOR.to_string())
}

/// Canonical message as the bytes handed to the signature primitive.
pub fn canonical_bytes(identity: &[u8], handle: &Handle, operation: &Operation) -> Vec<u8> {
    canonical_message(identity, handle, operation).into_bytes()
}
