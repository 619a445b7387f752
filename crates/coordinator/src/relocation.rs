//! Handing a worker's remaining work to another node on shutdown.
//!
//! Only a top-level worker relocates. When its node is marked for shutdown
//! the [`StickyNodePicker`] picks a healthy node once, the worker stops after
//! its current batch with resume data, and
//! [`RelocationCoordinator::with_relocation`] sends that data to the picked
//! node and ends the original task with a [`RelocationSignal`].

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use reflow_core::{ClusterView, NodeId};
use reflow_task::{BulkResponse, BulkTask, RelocationTarget};
use tracing::{debug, info};

use crate::error::{CoordinatorError, RelocationSignal};
use crate::ports::ClusterClient;
use crate::request::{BulkRequest, ResumeRequest};

/// Relocation target that is picked lazily and never changes once picked.
///
/// Until a node is picked every call looks at a fresh cluster snapshot. The
/// winner is installed with a compare-and-swap on an empty slot, so racing
/// callers all observe the same node.
pub struct StickyNodePicker {
    cluster: Arc<dyn ClusterView>,
    picked: ArcSwapOption<NodeId>,
}

impl StickyNodePicker {
    /// A picker reading membership from `cluster`.
    pub fn new(cluster: Arc<dyn ClusterView>) -> Self {
        Self {
            cluster,
            picked: ArcSwapOption::empty(),
        }
    }
}

impl RelocationTarget for StickyNodePicker {
    fn pick(&self) -> Option<NodeId> {
        let current = self.picked.load();
        if let Some(node) = current.as_deref() {
            return Some(node.clone());
        }

        let snapshot = self.cluster.snapshot();
        if !snapshot.local_shutting_down() {
            return None;
        }
        let candidate = Arc::new(snapshot.healthy_remote_nodes().next()?.id.clone());

        let previous = self.picked.compare_and_swap(&current, Some(Arc::clone(&candidate)));
        match previous.as_deref() {
            Some(winner) => Some(winner.clone()),
            None => {
                debug!(node = %candidate, version = snapshot.version, "picked relocation target");
                Some(NodeId::clone(&candidate))
            }
        }
    }

    fn picked(&self) -> Option<NodeId> {
        self.picked.load().as_deref().cloned()
    }
}

impl fmt::Debug for StickyNodePicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StickyNodePicker")
            .field("picked", &self.picked())
            .finish_non_exhaustive()
    }
}

/// Asks a worker to relocate once its relocation target can pick a node.
///
/// Returns `true` if relocation is requested. Tasks without a target never
/// relocate.
pub fn check_shutdown(task: &BulkTask) -> Result<bool, CoordinatorError> {
    if task.relocation_requested() {
        return Ok(true);
    }
    let Ok(worker) = task.worker_state() else {
        return Ok(false);
    };
    let Some(node) = worker.relocation_target().and_then(|target| target.pick()) else {
        return Ok(false);
    };
    task.request_relocation()?;
    info!(task = %task.id(), %node, "node is shutting down, relocating task");
    Ok(true)
}

/// Installs relocation targets and completes relocated tasks.
#[derive(Debug, Clone)]
pub struct RelocationCoordinator {
    cluster: Arc<dyn ClusterView>,
    client: Arc<dyn ClusterClient>,
}

impl RelocationCoordinator {
    /// Create a coordinator.
    pub fn new(cluster: Arc<dyn ClusterView>, client: Arc<dyn ClusterClient>) -> Self {
        Self { cluster, client }
    }

    /// Give `task` a sticky relocation target.
    ///
    /// Only a worker without a parent may relocate; slices and leaders are
    /// refused.
    pub fn install_target(&self, task: &BulkTask) -> Result<(), CoordinatorError> {
        if let Some(parent) = task.parent() {
            return Err(CoordinatorError::illegal_state(format!(
                "task [{}] is a slice of [{parent}] and cannot relocate",
                task.id()
            )));
        }
        let worker = task.worker_state().map_err(|_| {
            CoordinatorError::illegal_state(format!(
                "task [{}] is not a single worker and cannot relocate",
                task.id()
            ))
        })?;
        worker.install_relocation_target(Arc::new(StickyNodePicker::new(Arc::clone(&self.cluster))))?;
        Ok(())
    }

    /// Complete `task` with `result`, relocating it if the result carries
    /// resume data.
    ///
    /// Leaders and slices pass through untouched. On a successful handoff
    /// the result becomes [`CoordinatorError::Relocated`].
    pub async fn with_relocation(
        &self,
        task: &BulkTask,
        request: &BulkRequest,
        result: Result<BulkResponse, CoordinatorError>,
    ) -> Result<BulkResponse, CoordinatorError> {
        if task.is_leader() || task.parent().is_some() {
            return result;
        }
        let mut response = result?;
        let Some(resume_info) = response.resume_info.take() else {
            return Ok(response);
        };
        debug_assert!(
            !response.has_failures(),
            "a response carrying resume data must not carry failures"
        );

        let target = task
            .worker_state()?
            .relocation_target()
            .and_then(|target| target.picked())
            .ok_or_else(|| {
                CoordinatorError::illegal_state(format!(
                    "task [{}] stopped for relocation but no target node was picked",
                    task.id()
                ))
            })?;
        let snapshot = self.cluster.snapshot();
        let node = snapshot.node(&target).ok_or_else(|| {
            CoordinatorError::illegal_state(format!(
                "relocation target node [{target}] is no longer part of the cluster"
            ))
        })?;

        let resume = ResumeRequest::new(task.id().clone(), request.clone(), resume_info);
        let relocated = self.client.resume_on(node, resume).await?;
        let signal = RelocationSignal {
            original: task.id().clone(),
            relocated,
        };
        info!(original = %signal.original, relocated = %signal.relocated, "task relocated");
        Err(CoordinatorError::Relocated(signal))
    }
}
