//! HTTP transport to a real ledger endpoint.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};

use super::{LedgerRequest, LedgerResponse, Method, Transport, TransportError};
use crate::messages::JSON_CONTENT_TYPE;

/// Default ledger endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8082/";

/// Transport over HTTP with `reqwest`.
///
/// Redirects are never followed: a ledger that redirects is answering with
/// a non-200 status.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    /// Connect to `endpoint`, e.g. `http://localhost:8082/`.
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| TransportError::new(format!("building http client: {e}")))?;
        Self::with_client(client, endpoint)
    }

    /// Use a preconfigured client, e.g. one with timeouts.
    pub fn with_client(client: Client, endpoint: &str) -> Result<Self, TransportError> {
        let mut base = Url::parse(endpoint)
            .map_err(|e| TransportError::new(format!("invalid endpoint {endpoint:?}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn url_for(&self, request: &LedgerRequest) -> Result<Url, TransportError> {
        let mut url = self
            .base
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| TransportError::new(format!("invalid path {:?}: {e}", request.path)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: LedgerRequest) -> Result<LedgerResponse, TransportError> {
        let url = self.url_for(&request)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, url);
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?
            .to_vec();

        Ok(LedgerResponse {
            status,
            content_type,
            body,
        })
    }
}
