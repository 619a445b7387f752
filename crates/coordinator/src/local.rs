//! In-process [`ClusterClient`] that runs slices on the local orchestrator.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use reflow_core::{DiscoveryNode, TaskId};
use reflow_task::BulkResponse;

use crate::error::CoordinatorError;
use crate::orchestrator::Orchestrator;
use crate::ports::ClusterClient;
use crate::request::{BulkRequest, ResumeRequest};

/// Runs slice sub-requests as child tasks of the bound orchestrator.
///
/// The client is handed to the orchestrator it calls back into, so it only
/// keeps a weak reference, installed with [`bind`](Self::bind). Resume
/// requests are only accepted for the local node.
#[derive(Debug, Default)]
pub struct LocalClusterClient {
    orchestrator: OnceLock<Weak<Orchestrator>>,
}

impl LocalClusterClient {
    /// An unbound client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route requests to `orchestrator`. Only the first call has an effect.
    pub fn bind(&self, orchestrator: &Arc<Orchestrator>) {
        if self.orchestrator.set(Arc::downgrade(orchestrator)).is_err() {
            tracing::debug!("local cluster client is already bound");
        }
    }

    fn orchestrator(&self) -> Result<Arc<Orchestrator>, CoordinatorError> {
        self.orchestrator
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| CoordinatorError::Dispatch("local orchestrator is not available".to_string()))
    }
}

#[async_trait]
impl ClusterClient for LocalClusterClient {
    async fn execute_slice(&self, request: BulkRequest) -> Result<BulkResponse, CoordinatorError> {
        self.orchestrator()?.execute_slice(request).await
    }

    async fn resume_on(
        &self,
        node: &DiscoveryNode,
        request: ResumeRequest,
    ) -> Result<TaskId, CoordinatorError> {
        let orchestrator = self.orchestrator()?;
        if &node.id != orchestrator.registry().node() {
            return Err(CoordinatorError::Dispatch(format!(
                "no route to node [{}] from an in-process client",
                node.id
            )));
        }
        orchestrator.resume(request)
    }
}
