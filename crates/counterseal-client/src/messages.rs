//! Ledger wire messages.
//!
//! Bodies are JSON with PascalCase keys. Byte fields travel as unpadded
//! base64url strings and counters as JSON integers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use counterseal_core::{decode_field, Handle, RawSignature, Tag};

use crate::error::{ClientError, Result};
use crate::transport::LedgerResponse;

/// Path of the identity endpoint.
pub const SERVICE_ID_PATH: &str = "/serviceid";

/// Prefix of per-counter paths.
pub const COUNTERS_PREFIX: &str = "/counters/";

/// Media type every body must carry.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Path of the counter named by `handle`.
pub fn counter_path(handle: &Handle) -> String {
    format!("{}{}", COUNTERS_PREFIX, handle.to_base64())
}

/// `GET /serviceid` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceIdResponse {
    pub identity: String,
    pub public_key: String,
}

/// `PUT /counters/{handle}` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewCounterRequest {
    pub tag: String,
}

/// `POST /counters/{handle}` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IncrementCounterRequest {
    pub tag: String,
    pub expected_counter: u64,
}

/// Create and increment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignatureResponse {
    pub signature: String,
}

/// `GET /counters/{handle}?nonce=` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadLatestResponse {
    pub counter: u64,
    pub tag: String,
    pub signature: String,
}

/// Whether a `Content-Type` value denotes JSON.
///
/// Case-insensitive; parameters such as `charset` are ignored.
pub fn is_json_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Check the content type and decode a JSON body.
pub fn parse_json<R: DeserializeOwned>(response: &LedgerResponse) -> Result<R> {
    match response.content_type.as_deref() {
        Some(value) if is_json_content_type(value) => {}
        other => {
            return Err(ClientError::UnexpectedContentType(
                other.unwrap_or("<none>").to_string(),
            ))
        }
    }
    serde_json::from_slice(&response.body).map_err(|e| ClientError::MalformedResponse(e.to_string()))
}

/// Decode a base64url raw signature.
pub fn decode_signature(field: &str) -> Result<RawSignature> {
    let bytes = decode_field(field).map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
    RawSignature::try_from(bytes.as_slice())
        .map_err(|e| ClientError::MalformedResponse(e.to_string()))
}

/// Decode a base64url tag.
pub fn decode_tag(field: &str) -> Result<Tag> {
    Tag::from_base64(field).map_err(|e| ClientError::MalformedResponse(e.to_string()))
}

/// Decode any other base64url byte field.
pub fn decode_bytes(field: &str) -> Result<Vec<u8>> {
    decode_field(field).map_err(|e| ClientError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn response(content_type: Option<&str>, body: &str) -> LedgerResponse {
        LedgerResponse {
            status: 200,
            content_type: content_type.map(str::to_string),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_json_content_type_variants() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/jsonp"));
    }

    #[test]
    fn test_parse_json_requires_content_type() {
        let result: Result<SignatureResponse> =
            parse_json(&response(Some("text/html"), r#"{"Signature":"AA"}"#));
        assert!(matches!(result, Err(ClientError::UnexpectedContentType(ct)) if ct == "text/html"));

        let result: Result<SignatureResponse> = parse_json(&response(None, r#"{"Signature":"AA"}"#));
        assert!(matches!(result, Err(ClientError::UnexpectedContentType(_))));
    }

    #[test]
    fn test_parse_json_reports_missing_fields() {
        let result: Result<ReadLatestResponse> =
            parse_json(&response(Some("application/json"), r#"{"Tag":"AA"}"#));
        assert!(matches!(result, Err(ClientError::MalformedResponse(_))));
    }

    #[test]
    fn test_pascal_case_bodies() {
        let body = IncrementCounterRequest {
            tag: "dGFnXzE".into(),
            expected_counter: 1,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"Tag":"dGFnXzE","ExpectedCounter":1}"#
        );

        let read: ReadLatestResponse = serde_json::from_str(
            r#"{"Counter": 3, "Tag": "dGFnXzE", "Signature": "AA"}"#,
        )
        .unwrap();
        assert_eq!(read.counter, 3);
    }

    #[test]
    fn test_decode_signature_length() {
        assert!(matches!(
            decode_signature("AAAA"),
            Err(ClientError::MalformedResponse(_))
        ));
        let sig = counterseal_core::encode_field(&[9u8; 64]);
        assert_eq!(decode_signature(&sig).unwrap().as_bytes(), &[9u8; 64]);
    }

    #[test]
    fn test_counter_path() {
        let handle = Handle::from_base64("HKL9dcyf4dsrhskxUHeF-g").unwrap();
        assert_eq!(counter_path(&handle), "/counters/HKL9dcyf4dsrhskxUHeF-g");
    }

    proptest! {
        #[test]
        fn test_signature_length_enforced(bytes in proptest::collection::vec(any::<u8>(), 0..100)) {
            let field = counterseal_core::encode_field(&bytes);
            match decode_signature(&field) {
                Ok(signature) => prop_assert_eq!(&signature.as_bytes()[..], &bytes[..]),
                Err(e) => {
                    prop_assert_ne!(bytes.len(), 64);
                    prop_assert!(matches!(e, ClientError::MalformedResponse(_)));
                }
            }
        }

        #[test]
        fn test_media_type_parameters_ignored(param in "[a-z]{1,8}=[a-z0-9-]{1,12}") {
            let value = format!("application/json; {param}");
            prop_assert!(is_json_content_type(&value));
        }
    }
}
