//! A simulated ledger for tests.
//!
//! [`MemoryLedger`] speaks the wire protocol directly: it keeps one tag
//! sequence per handle, signs canonical messages with its own P-256 key and
//! answers with JSON bodies. Faults can be queued to make the next response
//! misbehave in a chosen way.

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

use counterseal_core::{
    canonical_bytes, decode_field, encode_field, CoreError, Handle, Nonce, Operation,
    PublicKeyFormat, ServiceIdentity, SigningKeyPair, Tag,
};

use super::{LedgerRequest, LedgerResponse, Method, Transport, TransportError};
use crate::error::NOT_FOUND;
use crate::messages::{
    IncrementCounterRequest, NewCounterRequest, ReadLatestResponse, ServiceIdResponse,
    SignatureResponse, COUNTERS_PREFIX, SERVICE_ID_PATH,
};

/// Misbehaviour applied to the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Flip a bit in the returned signature.
    TamperSignature,
    /// Answer with this status and no body, without applying the request.
    Status(u16),
    /// Answer normally but with this content type.
    ContentType(String),
    /// Answer a read with the body of the previous read.
    ReplayLastRead,
    /// Accept an increment whatever its expected counter.
    AcceptAnyExpected,
    /// Apply the request, then fail as if the connection dropped.
    FailAfterApply,
    /// Fail without reaching the ledger.
    Unreachable,
}

#[derive(Default)]
struct LedgerState {
    counters: HashMap<Handle, Vec<Tag>>,
    faults: VecDeque<Fault>,
    requests: Vec<LedgerRequest>,
    last_read: Option<Vec<u8>>,
}

/// In-memory ledger implementing [`Transport`].
pub struct MemoryLedger {
    identity: Bytes,
    keys: SigningKeyPair,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// A ledger with a random identity and a fresh key.
    pub fn new() -> Self {
        let mut identity = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut identity);
        Self::with_identity(identity.to_vec())
    }

    /// A ledger with a chosen identity and a fresh key.
    pub fn with_identity(identity: impl Into<Bytes>) -> Self {
        Self {
            identity: identity.into(),
            keys: SigningKeyPair::generate(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn identity(&self) -> &[u8] {
        &self.identity
    }

    /// The identity a client would fetch, for assertions.
    pub fn service_identity(&self) -> Result<ServiceIdentity, CoreError> {
        let public_key = self.keys.public_key_bytes().unwrap_or_default();
        ServiceIdentity::from_parts(self.identity.clone(), public_key, PublicKeyFormat::Compressed)
    }

    /// Queue a fault for the next request.
    pub async fn inject(&self, fault: Fault) {
        self.state.lock().await.faults.push_back(fault);
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<LedgerRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn clear_requests(&self) {
        self.state.lock().await.requests.clear();
    }

    /// Increment requests received so far, as `(tag, expected_counter)`.
    pub async fn increments(&self) -> Vec<(Tag, u64)> {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .filter(|r| r.method == Method::Post)
            .filter_map(|r| parse_body::<IncrementCounterRequest>(r).ok())
            .filter_map(|body| {
                Tag::from_base64(&body.tag)
                    .ok()
                    .map(|tag| (tag, body.expected_counter))
            })
            .collect()
    }

    /// Latest `(counter, tag)` for `handle`.
    pub async fn latest(&self, handle: &Handle) -> Option<(u64, Tag)> {
        let state = self.state.lock().await;
        let tags = state.counters.get(handle)?;
        let tag = tags.last()?.clone();
        Some((tags.len() as u64 - 1, tag))
    }

    /// Append a tag as another writer would. Returns the new counter.
    pub async fn append_external(&self, handle: &Handle, tag: Tag) -> Option<u64> {
        let mut state = self.state.lock().await;
        let tags = state.counters.get_mut(handle)?;
        tags.push(tag);
        Some(tags.len() as u64 - 1)
    }

    fn sign(&self, operation: Operation, handle: &Handle, tamper: bool) -> Result<String, TransportError> {
        let message = canonical_bytes(&self.identity, handle, &operation);
        let signature = self
            .keys
            .sign(&message)
            .map_err(|e| TransportError::new(e.to_string()))?;
        let mut raw = signature.0;
        if tamper {
            raw[63] ^= 0x01;
        }
        Ok(encode_field(&raw))
    }

    fn service_id(&self, request: &LedgerRequest) -> Result<LedgerResponse, TransportError> {
        let public_key = match request.query_param("pkformat") {
            Some("compressed") => self.keys.public_key().map(|k| k.to_compressed()),
            _ => self.keys.public_key().map(|k| k.to_raw()),
        }
        .unwrap_or_default();

        json(
            200,
            &ServiceIdResponse {
                identity: encode_field(&self.identity),
                public_key: encode_field(&public_key),
            },
        )
    }

    fn new_counter(
        &self,
        state: &mut LedgerState,
        handle: Handle,
        request: &LedgerRequest,
        tamper: bool,
    ) -> Result<LedgerResponse, TransportError> {
        let Ok(body) = parse_body::<NewCounterRequest>(request) else {
            return Ok(LedgerResponse::empty(400));
        };
        let Ok(tag) = Tag::from_base64(&body.tag) else {
            return Ok(LedgerResponse::empty(400));
        };
        if state.counters.contains_key(&handle) {
            return Ok(LedgerResponse::empty(409));
        }

        state.counters.insert(handle, vec![tag.clone()]);
        let signature = self.sign(Operation::NewCounter { tag }, &handle, tamper)?;
        json(200, &SignatureResponse { signature })
    }

    fn read_latest(
        &self,
        state: &mut LedgerState,
        handle: Handle,
        request: &LedgerRequest,
        tamper: bool,
        replay: bool,
    ) -> Result<LedgerResponse, TransportError> {
        if replay {
            if let Some(stale) = state.last_read.clone() {
                return Ok(LedgerResponse::json(200, stale));
            }
        }

        let nonce = request
            .query_param("nonce")
            .and_then(|n| decode_field(n).ok())
            .and_then(|bytes| Nonce::try_from(bytes.as_slice()).ok());
        let Some(nonce) = nonce else {
            return Ok(LedgerResponse::empty(400));
        };
        let Some((counter, tag)) = state
            .counters
            .get(&handle)
            .and_then(|tags| tags.last().map(|tag| (tags.len() as u64 - 1, tag.clone())))
        else {
            return Ok(LedgerResponse::empty(NOT_FOUND));
        };

        let signature = self.sign(
            Operation::ReadLatest {
                counter,
                tag: tag.clone(),
                nonce,
            },
            &handle,
            tamper,
        )?;
        let response = json(
            200,
            &ReadLatestResponse {
                counter,
                tag: tag.to_base64(),
                signature,
            },
        )?;
        state.last_read = Some(response.body.clone());
        Ok(response)
    }

    fn increment(
        &self,
        state: &mut LedgerState,
        handle: Handle,
        request: &LedgerRequest,
        tamper: bool,
        accept_any: bool,
    ) -> Result<LedgerResponse, TransportError> {
        let Ok(body) = parse_body::<IncrementCounterRequest>(request) else {
            return Ok(LedgerResponse::empty(400));
        };
        let Ok(tag) = Tag::from_base64(&body.tag) else {
            return Ok(LedgerResponse::empty(400));
        };
        let Some(tags) = state.counters.get_mut(&handle) else {
            return Ok(LedgerResponse::empty(NOT_FOUND));
        };

        let next = tags.len() as u64;
        if body.expected_counter != next && !accept_any {
            return Ok(LedgerResponse::empty(409));
        }
        tags.push(tag.clone());

        let signature = self.sign(
            Operation::IncrementCounter {
                tag,
                expected_counter: body.expected_counter,
            },
            &handle,
            tamper,
        )?;
        json(200, &SignatureResponse { signature })
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryLedger {
    async fn execute(&self, request: LedgerRequest) -> Result<LedgerResponse, TransportError> {
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());
        let fault = state.faults.pop_front();
        debug!(method = ?request.method, path = %request.path, ?fault, "memory ledger request");

        match &fault {
            Some(Fault::Unreachable) => return Err(TransportError::new("ledger unreachable")),
            Some(Fault::Status(status)) => return Ok(LedgerResponse::empty(*status)),
            _ => {}
        }

        let tamper = fault == Some(Fault::TamperSignature);
        let handle = request
            .path
            .strip_prefix(COUNTERS_PREFIX)
            .map(Handle::from_base64);

        let mut response = match (request.method, handle) {
            (Method::Get, None) if request.path == SERVICE_ID_PATH => self.service_id(&request)?,
            (Method::Put, Some(Ok(handle))) => {
                self.new_counter(&mut state, handle, &request, tamper)?
            }
            (Method::Get, Some(Ok(handle))) => {
                let replay = fault == Some(Fault::ReplayLastRead);
                self.read_latest(&mut state, handle, &request, tamper, replay)?
            }
            (Method::Post, Some(Ok(handle))) => {
                let accept_any = fault == Some(Fault::AcceptAnyExpected);
                self.increment(&mut state, handle, &request, tamper, accept_any)?
            }
            _ => LedgerResponse::empty(NOT_FOUND),
        };

        match fault {
            Some(Fault::ContentType(content_type)) => response.content_type = Some(content_type),
            Some(Fault::FailAfterApply) => return Err(TransportError::new("connection reset")),
            _ => {}
        }
        Ok(response)
    }
}

fn parse_body<R: DeserializeOwned>(request: &LedgerRequest) -> Result<R, serde_json::Error> {
    serde_json::from_slice(request.body.as_deref().unwrap_or_default())
}

fn json<B: serde::Serialize>(status: u16, body: &B) -> Result<LedgerResponse, TransportError> {
    let body = serde_json::to_vec(body).map_err(|e| TransportError::new(e.to_string()))?;
    Ok(LedgerResponse::json(status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::counter_path;

    fn put(handle: &Handle, tag: &str) -> LedgerRequest {
        let body = serde_json::to_vec(&NewCounterRequest {
            tag: Tag::new(tag.as_bytes().to_vec()).to_base64(),
        })
        .unwrap();
        LedgerRequest::put(counter_path(handle), body)
    }

    fn post(handle: &Handle, tag: &str, expected: u64) -> LedgerRequest {
        let body = serde_json::to_vec(&IncrementCounterRequest {
            tag: Tag::new(tag.as_bytes().to_vec()).to_base64(),
            expected_counter: expected,
        })
        .unwrap();
        LedgerRequest::post(counter_path(handle), body)
    }

    #[tokio::test]
    async fn test_counter_lifecycle() {
        let ledger = MemoryLedger::new();
        let handle = Handle::random();

        assert_eq!(ledger.execute(put(&handle, "t0")).await.unwrap().status, 200);
        assert_eq!(ledger.execute(put(&handle, "t0")).await.unwrap().status, 409);
        assert_eq!(ledger.execute(post(&handle, "t1", 1)).await.unwrap().status, 200);
        assert_eq!(ledger.execute(post(&handle, "t9", 5)).await.unwrap().status, 409);

        assert_eq!(ledger.latest(&handle).await, Some((1, Tag::from("t1"))));
        assert_eq!(ledger.increments().await, vec![
            (Tag::from("t1"), 1),
            (Tag::from("t9"), 5)
        ]);
    }

    #[tokio::test]
    async fn test_unknown_handle_is_not_found() {
        let ledger = MemoryLedger::new();
        let response = ledger.execute(post(&Handle::random(), "t", 1)).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_faults_apply_once() {
        let ledger = MemoryLedger::new();
        let handle = Handle::random();
        ledger.inject(Fault::Status(503)).await;

        assert_eq!(ledger.execute(put(&handle, "t0")).await.unwrap().status, 503);
        assert_eq!(ledger.latest(&handle).await, None);
        assert_eq!(ledger.execute(put(&handle, "t0")).await.unwrap().status, 200);
    }

    #[tokio::test]
    async fn test_fail_after_apply_still_applies() {
        let ledger = MemoryLedger::new();
        let handle = Handle::random();
        ledger.execute(put(&handle, "t0")).await.unwrap();

        ledger.inject(Fault::FailAfterApply).await;
        assert!(ledger.execute(post(&handle, "t1", 1)).await.is_err());
        assert_eq!(ledger.latest(&handle).await, Some((1, Tag::from("t1"))));
    }

    #[tokio::test]
    async fn test_service_id_key_formats() {
        let ledger = MemoryLedger::new();
        let compressed = ledger
            .execute(LedgerRequest::get(SERVICE_ID_PATH).with_query("pkformat", "compressed"))
            .await
            .unwrap();
        let raw = ledger.execute(LedgerRequest::get(SERVICE_ID_PATH)).await.unwrap();

        let compressed: ServiceIdResponse = serde_json::from_slice(&compressed.body).unwrap();
        let raw: ServiceIdResponse = serde_json::from_slice(&raw.body).unwrap();
        assert_eq!(decode_field(&compressed.public_key).unwrap().len(), 33);
        assert_eq!(decode_field(&raw.public_key).unwrap().len(), 64);
    }
}
