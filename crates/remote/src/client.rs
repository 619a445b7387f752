//! [`RemoteTransport`] over HTTP with `reqwest`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::CONTENT_TYPE;

use crate::error::TransportError;
use crate::transport::{RemoteRequest, RemoteResponse, RemoteTransport};

/// Default bound on a buffered response body.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 100 * 1024 * 1024;

/// Connection settings of an [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Scheme, host and port of the remote, e.g. `http://remote:9200`.
    pub base_url: String,
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Time allowed between reads.
    pub socket_timeout: Duration,
    /// Largest body that is buffered before failing.
    pub max_response_bytes: usize,
}

impl HttpTransportConfig {
    /// Defaults for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(30),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// HTTP transport to one remote cluster.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    socket_timeout: Duration,
    max_response_bytes: usize,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Build a transport.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.socket_timeout)
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            socket_timeout: config.socket_timeout,
            max_response_bytes: config.max_response_bytes,
            closed: AtomicBool::new(false),
        })
    }

    fn map_error(&self, error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.socket_timeout)
        } else {
            TransportError::Io(error.to_string())
        }
    }

    /// Buffer the body, failing once it grows past the bound.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Bytes, TransportError> {
        let limit = self.max_response_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(TransportError::BodyTooLarge { limit });
        }
        let mut buffer = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(&e))? {
            if buffer.len() + chunk.len() > limit {
                return Err(TransportError::BodyTooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn perform(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let url = format!("{}{}", self.base_url, request.path_and_query());
        let mut builder = self.client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::trace!(method = %request.method, %url, "sending remote request");
        let response = builder.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = self.read_body(response).await;

        Ok(RemoteResponse {
            status,
            content_type,
            body,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}
