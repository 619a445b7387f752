//! Transport seam between the remote protocol and the HTTP client.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;

use crate::error::TransportError;

/// A request to the remote cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// HTTP method.
    pub method: Method,
    /// Path, starting with `/`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    /// Extra headers.
    pub headers: BTreeMap<String, String>,
}

impl RemoteRequest {
    /// A request without query, body or headers.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: BTreeMap::new(),
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path plus query string.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.path)
    }
}

/// What came back from the remote.
///
/// The body is a `Result` because reading it is a separate step that can
/// fail after the status line and headers arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP status as sent by the remote, not validated.
    pub status: u16,
    /// `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Body, or the error that interrupted reading it.
    pub body: Result<Bytes, TransportError>,
}

impl RemoteResponse {
    /// A JSON response.
    pub fn json(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: Ok(body.into()),
        }
    }
}

/// Sends requests to one remote cluster.
#[async_trait]
pub trait RemoteTransport: Send + Sync + fmt::Debug {
    /// Perform a request.
    async fn perform(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError>;

    /// Release connections. Later requests fail with [`TransportError::Closed`].
    async fn close(&self) -> Result<(), TransportError>;
}
