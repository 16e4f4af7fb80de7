//! Transport abstraction for the ledger protocol.
//!
//! The transport moves one request to the ledger and returns its response
//! verbatim. It does not interpret status codes or bodies; the client does.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod http;
pub mod memory;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
}

/// One request to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRequest {
    pub method: Method,
    /// Absolute path, e.g. `/counters/{handle}`.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

impl LedgerRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    pub fn put(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(Method::Put, path, Some(body))
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    fn new(method: Method, path: impl Into<String>, body: Option<Vec<u8>>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Look up a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The ledger's answer, uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl LedgerResponse {
    /// A JSON response.
    pub fn json(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: Some(crate::messages::JSON_CONTENT_TYPE.to_string()),
            body,
        }
    }

    /// A response with no body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }
}

/// The request could not be delivered or its response not read.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Request/response channel to the ledger.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `request` and return the ledger's response.
    async fn execute(&self, request: LedgerRequest) -> Result<LedgerResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(&self, request: LedgerRequest) -> Result<LedgerResponse, TransportError> {
        (**self).execute(request).await
    }
}
