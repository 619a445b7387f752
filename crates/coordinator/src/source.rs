//! Remote scroll source as a worker's [`ScrollSource`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reflow_remote::{
    HttpTransport, HttpTransportConfig, RemoteError, RemoteScrollSource, RemoteSearch,
    RemoteTransport, RetryCounter, ScrollPage,
};
use reflow_resilience::BackoffPolicy;
use reflow_task::{WorkerResume, WorkerState};
use semver::Version;

use crate::config::RemoteConfig;
use crate::error::CoordinatorError;
use crate::ports::{RemoteClientFactory, ScrollSource, SourceFactory};
use crate::request::{BulkRequest, RemoteInfo};

/// [`RemoteClientFactory`] building an [`HttpTransport`] per remote.
#[derive(Debug, Clone)]
pub struct HttpRemoteFactory {
    config: RemoteConfig,
}

impl HttpRemoteFactory {
    /// Transports use the timeouts and body bound of `config`.
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

impl RemoteClientFactory for HttpRemoteFactory {
    fn client(&self, remote: &RemoteInfo) -> Result<Arc<dyn RemoteTransport>, CoordinatorError> {
        let transport = HttpTransport::new(HttpTransportConfig {
            base_url: remote.host.clone(),
            connect_timeout: self.config.connect_timeout,
            socket_timeout: self.config.socket_timeout,
            max_response_bytes: self.config.max_response_bytes,
        })
        .map_err(RemoteError::from)?;
        Ok(Arc::new(transport))
    }
}

#[async_trait]
impl ScrollSource for RemoteScrollSource {
    async fn start(&mut self) -> Result<ScrollPage, CoordinatorError> {
        Ok(Self::start(self).await?)
    }

    async fn continue_scroll(
        &mut self,
        scroll_id: &str,
        keep_alive: Duration,
    ) -> Result<ScrollPage, CoordinatorError> {
        Ok(Self::continue_scroll(self, scroll_id, keep_alive).await?)
    }

    async fn clear_scroll(&mut self, scroll_id: &str) {
        Self::clear_scroll(self, scroll_id).await;
    }

    async fn close(&mut self) {
        self.cleanup(|| tracing::debug!("remote scroll source closed")).await;
    }

    fn remote_version(&self) -> Option<Version> {
        Self::remote_version(self).cloned()
    }
}

/// Opens [`RemoteScrollSource`]s for requests with a remote, and hands
/// local requests to the host's factory.
#[derive(Debug)]
pub struct RemoteSourceFactory {
    remotes: Arc<dyn RemoteClientFactory>,
    backoff: BackoffPolicy,
    keep_alive: Duration,
    local: Option<Arc<dyn SourceFactory>>,
}

impl RemoteSourceFactory {
    /// Create a factory. Rejections are retried with `backoff`; scrolls are
    /// kept alive for `keep_alive`.
    pub fn new(remotes: Arc<dyn RemoteClientFactory>, backoff: BackoffPolicy, keep_alive: Duration) -> Self {
        Self {
            remotes,
            backoff,
            keep_alive,
            local: None,
        }
    }

    /// Factory for requests without a remote.
    #[must_use]
    pub fn with_local(mut self, local: Arc<dyn SourceFactory>) -> Self {
        self.local = Some(local);
        self
    }
}

impl SourceFactory for RemoteSourceFactory {
    fn open(
        &self,
        request: &BulkRequest,
        worker: &Arc<WorkerState>,
        resume: Option<&WorkerResume>,
    ) -> Result<Box<dyn ScrollSource>, CoordinatorError> {
        let Some(remote) = &request.remote else {
            return match &self.local {
                Some(local) => local.open(request, worker, resume),
                None => Err(CoordinatorError::InvalidRequest(
                    "no source is configured for local requests".to_string(),
                )),
            };
        };

        let search = RemoteSearch {
            indices: request.indices.clone(),
            query: request.query.clone(),
            size: request.batch_size,
            slice: request.slice.as_ref().map(|slice| (slice.id, slice.max)),
        };
        let on_retry: RetryCounter = {
            let worker = Arc::clone(worker);
            Arc::new(move || worker.count_search_retry())
        };
        let mut source = RemoteScrollSource::new(
            self.remotes.client(remote)?,
            search,
            self.backoff.clone(),
            self.keep_alive,
            on_retry,
        );

        let resumed_version = resume
            .and_then(|resume| resume.remote_version.as_deref())
            .map(Version::parse)
            .transpose()
            .map_err(|e| CoordinatorError::InvalidRequest(format!("invalid remote version in resume data: {e}")))?;
        if let Some(version) = resumed_version.or_else(|| remote.version.clone()) {
            source = source.with_remote_version(version);
        }
        Ok(Box::new(source))
    }
}
