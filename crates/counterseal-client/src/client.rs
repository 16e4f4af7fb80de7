//! Verified ledger operations over one `(identity, handle)` context.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use counterseal_core::{
    encode_field, parse_public_key, CounterState, CounterStatus, Handle, Nonce, Operation,
    PublicKeyFormat, Receipt, ServiceIdentity, Tag,
};

use crate::error::{
    ClientError, Result, FETCH_IDENTITY, INCREMENT_COUNTER, NEW_COUNTER, READ_LATEST,
};
use crate::messages::{
    counter_path, decode_bytes, decode_signature, decode_tag, parse_json, IncrementCounterRequest,
    NewCounterRequest, ReadLatestResponse, ServiceIdResponse, SignatureResponse, SERVICE_ID_PATH,
};
use crate::transport::{LedgerRequest, LedgerResponse, Method, Transport};

/// Fetch the ledger's published identity.
///
/// No signature is checked here; there is nothing signed yet.
pub async fn fetch_identity<T: Transport + ?Sized>(
    transport: &T,
    format: PublicKeyFormat,
) -> Result<ServiceIdentity> {
    let mut request = LedgerRequest::get(SERVICE_ID_PATH);
    if matches!(format, PublicKeyFormat::Compressed | PublicKeyFormat::Auto) {
        request = request.with_query("pkformat", "compressed");
    }

    let response = send(transport, FETCH_IDENTITY, request).await?;
    check_status(FETCH_IDENTITY, Method::Get, None, &response)?;
    let body: ServiceIdResponse = parse_json(&response)?;

    let identity = decode_bytes(&body.identity)?;
    let mut public_key = decode_bytes(&body.public_key)?;
    // Without `pkformat` the ledger publishes raw X || Y.
    if format == PublicKeyFormat::Uncompressed {
        public_key = parse_public_key(&public_key, PublicKeyFormat::Auto)?.to_uncompressed();
    }
    let service = ServiceIdentity::from_parts(identity, public_key, format)?;
    debug!(?service, "fetched ledger identity");
    Ok(service)
}

async fn send<T: Transport + ?Sized>(
    transport: &T,
    operation: &'static str,
    request: LedgerRequest,
) -> Result<LedgerResponse> {
    transport
        .execute(request)
        .await
        .map_err(|e| ClientError::TransportFailure {
            operation,
            message: e.to_string(),
        })
}

fn check_status(
    operation: &'static str,
    method: Method,
    handle: Option<&Handle>,
    response: &LedgerResponse,
) -> Result<()> {
    match (response.status, method, handle) {
        (200, _, _) => Ok(()),
        (409, Method::Put, Some(handle)) => Err(ClientError::Conflict(*handle)),
        (status, _, _) => Err(ClientError::LedgerFault { operation, status }),
    }
}

/// Client for one counter on one ledger.
///
/// All counter-affecting calls hold the state lock across the network await,
/// so at most one create, read or increment is in flight per client.
pub struct LedgerClient<T: Transport> {
    transport: T,
    service: Arc<ServiceIdentity>,
    handle: Handle,
    state: Mutex<CounterState>,
}

impl<T: Transport> LedgerClient<T> {
    /// Create a client with no cached counter.
    pub fn new(transport: T, service: Arc<ServiceIdentity>, handle: Handle) -> Self {
        Self {
            transport,
            service,
            handle,
            state: Mutex::new(CounterState::new()),
        }
    }

    pub fn service(&self) -> &Arc<ServiceIdentity> {
        &self.service
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the cached counter state.
    pub async fn state(&self) -> CounterState {
        self.state.lock().await.clone()
    }

    /// Last verified `(counter, tag)` from the cache, without a network call.
    pub async fn cached(&self) -> Result<(u64, Tag)> {
        let state = self.state.lock().await;
        ensure_usable(&state)?;
        let counter = state.counter().ok_or(ClientError::NotInitialized)?;
        Ok((counter, state.tag().clone()))
    }

    /// Counter the next increment must produce.
    pub async fn expected_counter(&self) -> Result<u64> {
        let state = self.state.lock().await;
        ensure_usable(&state)?;
        state.expected_counter().ok_or(ClientError::NotInitialized)
    }

    /// Move the client to the terminal divergent state.
    ///
    /// For divergence found above the client, such as a replayed log whose
    /// tags disagree with the ledger. Every later counter-affecting call
    /// fails until the client is rebuilt.
    pub async fn mark_divergent(&self, ledger_counter: u64) {
        let mut state = self.state.lock().await;
        if !state.is_divergent() {
            error!(handle = %self.handle, ledger = ledger_counter, "client marked divergent");
        }
        state.mark_divergent(ledger_counter);
    }

    /// Create the counter at 0 holding `tag`.
    pub async fn create_counter(&self, tag: Tag) -> Result<Receipt> {
        let mut state = self.state.lock().await;
        ensure_usable(&state)?;

        match self.try_create(&tag).await {
            Ok(receipt) => {
                state.record(0, tag, receipt.signature);
                info!(handle = %self.handle, "created counter");
                Ok(receipt)
            }
            Err(e @ ClientError::Conflict(_)) => Err(e),
            Err(e) => {
                state.mark_unknown();
                warn!(handle = %self.handle, error = %e, "create outcome unknown, resync required");
                Err(e)
            }
        }
    }

    async fn try_create(&self, tag: &Tag) -> Result<Receipt> {
        let body = serialize(&NewCounterRequest {
            tag: tag.to_base64(),
        })?;
        let request = LedgerRequest::put(counter_path(&self.handle), body);

        let response = send(&self.transport, NEW_COUNTER, request).await?;
        check_status(NEW_COUNTER, Method::Put, Some(&self.handle), &response)?;
        let body: SignatureResponse = parse_json(&response)?;

        let operation = Operation::NewCounter { tag: tag.clone() };
        self.verified(NEW_COUNTER, operation, &body.signature)
    }

    /// Read the latest `(counter, tag)` under a fresh nonce.
    ///
    /// With no cached counter this establishes one. Otherwise the ledger's
    /// answer must equal the cache, or the client becomes divergent.
    pub async fn read_latest(&self) -> Result<Receipt> {
        let mut state = self.state.lock().await;
        ensure_usable(&state)?;

        let nonce = Nonce::random();
        let request = LedgerRequest::get(counter_path(&self.handle))
            .with_query("nonce", encode_field(nonce.as_bytes()));

        let response = send(&self.transport, READ_LATEST, request).await?;
        check_status(READ_LATEST, Method::Get, Some(&self.handle), &response)?;
        let body: ReadLatestResponse = parse_json(&response)?;

        let operation = Operation::ReadLatest {
            counter: body.counter,
            tag: decode_tag(&body.tag)?,
            nonce,
        };
        let receipt = self.verified(READ_LATEST, operation, &body.signature)?;
        debug!(counter = receipt.counter(), "verified read");

        if let CounterStatus::Known(local) = state.status() {
            let reason = if local != receipt.counter() {
                Some("counter mismatch")
            } else if state.tag() != receipt.tag() {
                Some("tag mismatch")
            } else {
                None
            };
            if let Some(reason) = reason {
                state.mark_divergent(receipt.counter());
                error!(local, ledger = receipt.counter(), reason, "ledger diverged from cached state");
                return Err(ClientError::DivergenceDetected {
                    local: Some(local),
                    ledger: receipt.counter(),
                    reason,
                });
            }
        }

        state.record(receipt.counter(), receipt.tag().clone(), receipt.signature);
        Ok(receipt)
    }

    /// Append `tag` expecting the ledger to produce `expected_counter`.
    ///
    /// Requires a known counter. A ledger that accepts an expected counter
    /// other than the cached one plus one has diverged.
    pub async fn increment_counter(&self, tag: Tag, expected_counter: u64) -> Result<Receipt> {
        let mut state = self.state.lock().await;
        self.increment_locked(&mut state, tag, Some(expected_counter)).await
    }

    /// Append `tag` at the cached counter plus one.
    pub async fn increment(&self, tag: Tag) -> Result<Receipt> {
        let mut state = self.state.lock().await;
        self.increment_locked(&mut state, tag, None).await
    }

    async fn increment_locked(
        &self,
        state: &mut CounterState,
        tag: Tag,
        expected_counter: Option<u64>,
    ) -> Result<Receipt> {
        ensure_usable(state)?;
        let current = state.counter().ok_or(ClientError::NotInitialized)?;
        let expected_counter = expected_counter.unwrap_or(current + 1);

        match self.try_increment(&tag, expected_counter).await {
            Ok(receipt) if expected_counter != current + 1 => {
                state.mark_divergent(receipt.counter());
                error!(
                    local = current,
                    ledger = expected_counter,
                    "ledger accepted a non-consecutive increment"
                );
                Err(ClientError::DivergenceDetected {
                    local: Some(current),
                    ledger: expected_counter,
                    reason: "non-consecutive increment accepted",
                })
            }
            Ok(receipt) => {
                state.record(expected_counter, tag, receipt.signature);
                info!(handle = %self.handle, counter = expected_counter, "incremented counter");
                Ok(receipt)
            }
            Err(e) => {
                state.mark_unknown();
                warn!(handle = %self.handle, error = %e, "increment outcome unknown, resync required");
                Err(e)
            }
        }
    }

    async fn try_increment(&self, tag: &Tag, expected_counter: u64) -> Result<Receipt> {
        let body = serialize(&IncrementCounterRequest {
            tag: tag.to_base64(),
            expected_counter,
        })?;
        let request = LedgerRequest::post(counter_path(&self.handle), body);

        let response = send(&self.transport, INCREMENT_COUNTER, request).await?;
        check_status(INCREMENT_COUNTER, Method::Post, Some(&self.handle), &response)?;
        let body: SignatureResponse = parse_json(&response)?;

        let operation = Operation::IncrementCounter {
            tag: tag.clone(),
            expected_counter,
        };
        self.verified(INCREMENT_COUNTER, operation, &body.signature)
    }

    /// Build the receipt for `operation` and check the ledger's signature.
    fn verified(&self, name: &'static str, operation: Operation, signature: &str) -> Result<Receipt> {
        let signature = decode_signature(signature)?;
        let receipt = Receipt::new(
            self.service.identity().to_vec(),
            self.handle,
            operation,
            signature,
        );
        if !receipt.verify(&self.service) {
            error!(operation = name, handle = %self.handle, "ledger signature does not verify");
            return Err(ClientError::UntrustedResponse { operation: name });
        }
        Ok(receipt)
    }
}

fn ensure_usable(state: &CounterState) -> Result<()> {
    match state.status() {
        CounterStatus::Divergent { local, ledger } => Err(ClientError::DivergenceDetected {
            local,
            ledger,
            reason: "client is divergent",
        }),
        _ => Ok(()),
    }
}

fn serialize<B: serde::Serialize>(body: &B) -> Result<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| ClientError::MalformedResponse(e.to_string()))
}
