//! Scroll over a remote cluster's search results.
//!
//! [`RemoteScrollSource::start`] issues the initial search (probing the
//! remote version first unless it is already known) and
//! [`RemoteScrollSource::continue_scroll`] fetches each following page. Every
//! request runs on its own spawned task with the caller's
//! [`RequestContext`](crate::RequestContext) restored, is retried on
//! rejection, and counts each retry through the caller's callback.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use reflow_core::SearchFailure;
use reflow_resilience::{BackoffPolicy, retry_with_backoff};
use semver::Version;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::context::{RequestContext, spawn_in_context};
use crate::error::{RemoteError, TransportError};
use crate::response::decode;
use crate::transport::{RemoteRequest, RemoteTransport};
use crate::version::{MainResponse, version_request};

/// Callback invoked once per retried request.
pub type RetryCounter = Arc<dyn Fn() + Send + Sync>;

/// What to read from the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSearch {
    /// Source indices.
    pub indices: Vec<String>,
    /// Query body. `match_all` when `None`.
    pub query: Option<Value>,
    /// Documents per page.
    pub size: u32,
    /// Slice of the search to read, as `(id, max)`.
    pub slice: Option<(u32, u32)>,
}

impl RemoteSearch {
    /// Read all documents of `indices`, `size` per page.
    pub fn new(indices: Vec<String>, size: u32) -> Self {
        Self {
            indices,
            query: None,
            size,
            slice: None,
        }
    }

    fn request(&self, keep_alive: Duration) -> RemoteRequest {
        let mut body = json!({
            "size": self.size,
            "query": self.query.clone().unwrap_or_else(|| json!({"match_all": {}})),
            "sort": ["_doc"],
        });
        if let Some((id, max)) = self.slice {
            body["slice"] = json!({"id": id, "max": max});
        }
        RemoteRequest::new(Method::POST, format!("/{}/_search", self.indices.join(",")))
            .with_query("scroll", keep_alive_param(keep_alive))
            .with_body(body)
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hit {
    /// Index the document lives in.
    #[serde(rename = "_index")]
    pub index: String,
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document version, if requested.
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    /// Custom routing.
    #[serde(rename = "_routing", default)]
    pub routing: Option<String>,
    /// Document body.
    #[serde(rename = "_source", default)]
    pub source: Option<Value>,
}

/// One decoded page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPage {
    /// Continuation token for the next page.
    pub scroll_id: Option<String>,
    /// Whether the search timed out on some shard.
    pub timed_out: bool,
    /// Estimated number of matching documents.
    pub total_hits: u64,
    /// Hits of this page.
    pub hits: Vec<Hit>,
    /// Shard or node failures reported alongside the hits.
    pub failures: Vec<SearchFailure>,
}

impl ScrollPage {
    /// Returns `true` if the page carries no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(default)]
    timed_out: bool,
    #[serde(rename = "_shards", default)]
    shards: Option<RawShards>,
    #[serde(default)]
    failures: Vec<RawFailure>,
    hits: RawHits,
}

#[derive(Debug, Deserialize)]
struct RawShards {
    #[serde(default)]
    failures: Vec<RawFailure>,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    #[serde(default)]
    total: Option<RawTotal>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct RawFailure {
    #[serde(default)]
    index: Option<String>,
    #[serde(default)]
    shard: Option<u32>,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    reason: Value,
}

impl From<RawFailure> for SearchFailure {
    fn from(raw: RawFailure) -> Self {
        let reason = match &raw.reason {
            Value::String(reason) => reason.clone(),
            Value::Object(object) => object
                .get("reason")
                .and_then(Value::as_str)
                .map_or_else(|| raw.reason.to_string(), str::to_string),
            Value::Null => "unknown".to_string(),
            other => other.to_string(),
        };
        Self {
            index: raw.index,
            shard: raw.shard,
            node: raw.node,
            reason,
            status: raw.status,
        }
    }
}

impl From<RawPage> for ScrollPage {
    fn from(raw: RawPage) -> Self {
        let total_hits = match raw.hits.total {
            Some(RawTotal::Count(count) | RawTotal::Object { value: count }) => count,
            None => 0,
        };
        let failures = raw
            .shards
            .map(|shards| shards.failures)
            .unwrap_or_default()
            .into_iter()
            .chain(raw.failures)
            .map(SearchFailure::from)
            .collect();
        Self {
            scroll_id: raw.scroll_id,
            timed_out: raw.timed_out,
            total_hits,
            hits: raw.hits.hits,
            failures,
        }
    }
}

fn keep_alive_param(keep_alive: Duration) -> String {
    format!("{}ms", keep_alive.as_millis())
}

/// Reads a search from a remote cluster page by page.
pub struct RemoteScrollSource {
    transport: Arc<dyn RemoteTransport>,
    search: RemoteSearch,
    backoff: BackoffPolicy,
    keep_alive: Duration,
    remote_version: Option<Version>,
    on_retry: RetryCounter,
}

impl RemoteScrollSource {
    /// Create a source. `on_retry` is called once per retried request.
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        search: RemoteSearch,
        backoff: BackoffPolicy,
        keep_alive: Duration,
        on_retry: RetryCounter,
    ) -> Self {
        Self {
            transport,
            search,
            backoff,
            keep_alive,
            remote_version: None,
            on_retry,
        }
    }

    /// Skip the version probe; the remote is known to run `version`.
    #[must_use]
    pub fn with_remote_version(mut self, version: Version) -> Self {
        self.remote_version = Some(version);
        self
    }

    /// Remote version, once known.
    #[must_use]
    pub fn remote_version(&self) -> Option<&Version> {
        self.remote_version.as_ref()
    }

    /// Probe the version if needed, then fetch the first page.
    pub async fn start(&mut self) -> Result<ScrollPage, RemoteError> {
        if self.remote_version.is_none() {
            let main: MainResponse = self.execute(version_request()).await?;
            debug!(version = %main.version.number, "resolved remote version");
            self.remote_version = Some(main.version.number);
        }
        let raw: RawPage = self.execute(self.search.request(self.keep_alive)).await?;
        Ok(raw.into())
    }

    /// Fetch the page after `scroll_id`.
    pub async fn continue_scroll(
        &self,
        scroll_id: &str,
        keep_alive: Duration,
    ) -> Result<ScrollPage, RemoteError> {
        let request = RemoteRequest::new(Method::POST, "/_search/scroll").with_body(json!({
            "scroll": keep_alive_param(keep_alive),
            "scroll_id": scroll_id,
        }));
        let raw: RawPage = self.execute(request).await?;
        Ok(raw.into())
    }

    /// Release the scroll on the remote. Failures are logged, not returned.
    pub async fn clear_scroll(&self, scroll_id: &str) {
        let request = RemoteRequest::new(Method::DELETE, "/_search/scroll")
            .with_body(json!({ "scroll_id": [scroll_id] }));
        let result = match self.transport.perform(request).await {
            Ok(response) if (200..300).contains(&response.status) || response.status == 404 => Ok(()),
            Ok(response) => Err(format!("status [{}]", response.status)),
            Err(error) => Err(error.to_string()),
        };
        if let Err(reason) = result {
            warn!(%reason, "failed to clear remote scroll");
        }
    }

    /// Close the transport, then call `on_done`. `on_done` runs even if
    /// closing fails.
    pub async fn cleanup<F: FnOnce()>(&self, on_done: F) {
        match self.transport.close().await {
            Ok(()) => debug!("closed remote transport"),
            Err(error) => warn!(%error, "failed to close remote transport"),
        }
        on_done();
    }

    async fn execute<T>(&self, mut request: RemoteRequest) -> Result<T, RemoteError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if let Some(context) = RequestContext::current() {
            request.headers.extend(
                context
                    .headers()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }
        let transport = Arc::clone(&self.transport);
        let backoff = self.backoff.clone();
        let on_retry = Arc::clone(&self.on_retry);

        spawn_in_context(async move {
            retry_with_backoff(
                &backoff,
                RemoteError::is_rejection,
                |error| {
                    warn!(%error, "remote rejected request, retrying");
                    on_retry();
                },
                || {
                    let transport = Arc::clone(&transport);
                    let request = request.clone();
                    async move { decode::<T>(transport.perform(request).await?) }
                },
            )
            .await
        })
        .await
        .map_err(|error| {
            RemoteError::Transport(TransportError::Io(format!("remote request task failed: {error}")))
        })?
    }
}

impl fmt::Debug for RemoteScrollSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteScrollSource")
            .field("transport", &self.transport)
            .field("search", &self.search)
            .field("backoff", &self.backoff)
            .field("remote_version", &self.remote_version)
            .finish_non_exhaustive()
    }
}
