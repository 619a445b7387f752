//! Runs bulk operations end to end.
//!
//! [`Orchestrator::execute`] gives the task its role, resolves the remote
//! version once for all slices, fans out or runs the worker, then passes
//! the raw result through relocation and finally metrics. A relocated
//! result skips metrics; the successor task reports the final outcome.
//! Slice sub-tasks never record metrics; their leader's merged response
//! already counts them.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use reflow_core::{ClusterView, TaskId};
use reflow_remote::{probe_with_retries, spawn_in_context};
use reflow_task::{BulkResponse, BulkTask, TaskRegistry, TaskRole, TaskSpec};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::metrics::BulkMetrics;
use crate::ports::{ClusterClient, RemoteClientFactory, ShardTopology, WorkerAction};
use crate::relocation::RelocationCoordinator;
use crate::request::{BulkRequest, ResumeRequest};
use crate::slicing::{fan_out, init_role};

/// Host-provided collaborators of an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Membership view of the cluster.
    pub cluster: Arc<dyn ClusterView>,
    /// Primary shard counts for automatic slicing.
    pub topology: Arc<dyn ShardTopology>,
    /// Dispatch of slices and resume requests.
    pub client: Arc<dyn ClusterClient>,
    /// What a worker task does.
    pub action: Arc<dyn WorkerAction>,
    /// Transports to remote clusters, for the version probe.
    pub remotes: Arc<dyn RemoteClientFactory>,
    /// Where finished operations are recorded.
    pub metrics: Arc<dyn BulkMetrics>,
}

/// Node-local entry point for bulk operations.
#[derive(Debug)]
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    config: CoordinatorConfig,
    parts: Collaborators,
    relocation: RelocationCoordinator,
    running: DashMap<TaskId, JoinHandle<Result<BulkResponse, CoordinatorError>>>,
}

impl Orchestrator {
    /// Create an orchestrator registering tasks in `registry`.
    pub fn new(registry: Arc<TaskRegistry>, config: CoordinatorConfig, parts: Collaborators) -> Self {
        let relocation = RelocationCoordinator::new(Arc::clone(&parts.cluster), Arc::clone(&parts.client));
        Self {
            registry,
            config,
            parts,
            relocation,
            running: DashMap::new(),
        }
    }

    /// The task registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Register a task for `request`.
    ///
    /// Only top-level requests are eligible for relocation, and only when
    /// relocation is enabled.
    pub fn register(&self, request: &BulkRequest) -> Arc<BulkTask> {
        let mut spec = TaskSpec::new(request.kind.action())
            .with_description(request.description())
            .relocation_eligible(self.config.relocation.enabled && request.parent_task.is_none());
        if let Some(parent) = &request.parent_task {
            spec = spec.with_parent(parent.clone());
        }
        self.registry.register(spec)
    }

    /// Register, execute and unregister a top-level request.
    pub async fn run(&self, request: BulkRequest) -> Result<BulkResponse, CoordinatorError> {
        let task = self.register(&request);
        let result = self.execute(Arc::clone(&task), request).await;
        self.registry.unregister(task.id());
        result
    }

    /// Execute `request` as `task`.
    pub async fn execute(
        &self,
        task: Arc<BulkTask>,
        request: BulkRequest,
    ) -> Result<BulkResponse, CoordinatorError> {
        let span = info_span!("bulk", task = %task.id(), action = task.action());
        self.execute_inner(task, request).instrument(span).await
    }

    async fn execute_inner(
        &self,
        task: Arc<BulkTask>,
        request: BulkRequest,
    ) -> Result<BulkResponse, CoordinatorError> {
        let started = Instant::now();
        let result = self.execute_raw(&task, &request).await;
        let result = self.relocation.with_relocation(&task, &request, result).await;

        match &result {
            _ if task.parent().is_some() => {}
            Err(CoordinatorError::Relocated(signal)) => {
                debug!(relocated = %signal.relocated, "skipping metrics for relocated task");
            }
            Ok(response) => {
                self.parts
                    .metrics
                    .record_success(task.action(), response, started.elapsed());
            }
            Err(error) => {
                warn!(%error, "bulk operation failed");
                self.parts
                    .metrics
                    .record_failure(task.action(), error, started.elapsed());
            }
        }
        result
    }

    async fn execute_raw(
        &self,
        task: &Arc<BulkTask>,
        request: &BulkRequest,
    ) -> Result<BulkResponse, CoordinatorError> {
        request.validate()?;
        let role = init_role(task, request, self.parts.topology.as_ref())?;
        let request = self.resolve_remote_version(request.clone()).await?;

        match role {
            TaskRole::Leader(leader) => {
                fan_out(task, &leader, &request, self.parts.client.as_ref()).await
            }
            TaskRole::Worker(worker) => {
                if task.relocation_eligible() && task.parent().is_none() {
                    self.relocation.install_target(task)?;
                }
                self.parts
                    .action
                    .run(Arc::clone(task), worker, request)
                    .await
            }
            TaskRole::Unassigned => Err(CoordinatorError::illegal_state(format!(
                "task [{}] has no role after initialization",
                task.id()
            ))),
        }
    }

    /// Probe the remote version once so slices and relocated successors
    /// skip the probe.
    async fn resolve_remote_version(
        &self,
        mut request: BulkRequest,
    ) -> Result<BulkRequest, CoordinatorError> {
        let Some(remote) = request.remote.as_mut() else {
            return Ok(request);
        };
        if remote.version.is_some() {
            return Ok(request);
        }
        let transport = self.parts.remotes.client(remote)?;
        let probed = probe_with_retries(&self.config.remote.backoff, transport.as_ref()).await;
        if let Err(error) = transport.close().await {
            debug!(%error, "failed to close version probe transport");
        }
        let version = probed?;
        info!(host = %remote.host, %version, "resolved remote version");
        remote.version = Some(version);
        Ok(request)
    }

    /// Run one slice sub-request as a child of its parent task.
    pub async fn execute_slice(&self, request: BulkRequest) -> Result<BulkResponse, CoordinatorError> {
        if request.parent_task.is_none() || request.slice.is_none() {
            return Err(CoordinatorError::InvalidRequest(
                "a slice sub-request needs a parent task and a slice".to_string(),
            ));
        }
        let task = self.register(&request);
        let result = self.execute(Arc::clone(&task), request).await;
        self.registry.unregister(task.id());
        result
    }

    /// Continue an interrupted operation on this node.
    ///
    /// The new task runs in the background; its id is returned at once so
    /// the caller can follow it. [`join`](Self::join) waits for its result.
    /// A task nobody joins stops being tracked once it finishes; its outcome
    /// is still recorded in metrics.
    pub fn resume(self: &Arc<Self>, resume: ResumeRequest) -> Result<TaskId, CoordinatorError> {
        let ResumeRequest { original, request } = resume;
        if !request.is_resume() {
            return Err(CoordinatorError::InvalidRequest(
                "a resume request must carry resume data".to_string(),
            ));
        }
        request.validate()?;

        let task = self.register(&request);
        let id = task.id().clone();
        info!(%original, resumed = %id, "resuming relocated task");

        // The task must not finish before its handle is tracked, or its
        // own removal would run first and leave the entry behind.
        let (tracked, wait_tracked) = oneshot::channel::<()>();
        let this = Arc::clone(self);
        let handle = spawn_in_context(async move {
            let _ = wait_tracked.await;
            let result = this.execute(Arc::clone(&task), request).await;
            this.registry.unregister(task.id());
            this.running.remove(task.id());
            result
        });
        self.running.insert(id.clone(), handle);
        let _ = tracked.send(());
        Ok(id)
    }

    /// Number of resumed tasks that are still tracked for [`join`](Self::join).
    #[must_use]
    pub fn resumed_in_flight(&self) -> usize {
        self.running.len()
    }

    /// Wait for a task started by [`resume`](Self::resume). `None` if no
    /// such task was started here, it was already joined, or it finished
    /// before anyone joined it.
    pub async fn join(&self, id: &TaskId) -> Option<Result<BulkResponse, CoordinatorError>> {
        let (_, handle) = self.running.remove(id)?;
        Some(handle.await.unwrap_or_else(|error| {
            if error.is_cancelled() {
                Err(CoordinatorError::Cancelled(format!("task [{id}] was aborted")))
            } else {
                Err(CoordinatorError::Dispatch(format!("task [{id}] did not complete: {error}")))
            }
        }))
    }

    /// Cancel a task and its local slices.
    pub fn cancel(&self, id: &TaskId, reason: &str) -> Result<(), CoordinatorError> {
        Ok(self.registry.cancel(id, reason)?)
    }
}
