//! Collaborators the coordinator drives but does not implement.
//!
//! Shard resolution, dispatch to other nodes, the bulk writer and the local
//! search are owned by the host. The coordinator only sees these traits.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reflow_core::{BulkFailure, DiscoveryNode, TaskId};
use reflow_remote::{Hit, RemoteTransport, ScrollPage};
use reflow_task::{BulkResponse, BulkTask, WorkerResume, WorkerState};
use semver::Version;

use crate::error::CoordinatorError;
use crate::request::{BulkRequest, RemoteInfo, ResumeRequest};

/// Sends requests to tasks on this or other nodes.
#[async_trait]
pub trait ClusterClient: Send + Sync + fmt::Debug {
    /// Run one slice sub-request as a child task and wait for its response.
    async fn execute_slice(&self, request: BulkRequest) -> Result<BulkResponse, CoordinatorError>;

    /// Start `request` on `node`. Returns the id of the new task there.
    async fn resume_on(
        &self,
        node: &DiscoveryNode,
        request: ResumeRequest,
    ) -> Result<TaskId, CoordinatorError>;
}

/// Primary shard counts of indices.
pub trait ShardTopology: Send + Sync + fmt::Debug {
    /// Primary shard count of each of `indices`, in order.
    fn shard_counts(&self, indices: &[String]) -> Result<Vec<u32>, CoordinatorError>;
}

/// The work a worker task does.
#[async_trait]
pub trait WorkerAction: Send + Sync + fmt::Debug {
    /// Run `request` as `task`, reporting progress through `worker`.
    async fn run(
        &self,
        task: Arc<BulkTask>,
        worker: Arc<WorkerState>,
        request: BulkRequest,
    ) -> Result<BulkResponse, CoordinatorError>;
}

/// Builds transports to remote clusters.
pub trait RemoteClientFactory: Send + Sync + fmt::Debug {
    /// A transport to `remote`.
    fn client(&self, remote: &RemoteInfo) -> Result<Arc<dyn RemoteTransport>, CoordinatorError>;
}

/// Pages of documents to process.
#[async_trait]
pub trait ScrollSource: Send + fmt::Debug {
    /// Fetch the first page.
    async fn start(&mut self) -> Result<ScrollPage, CoordinatorError>;

    /// Fetch the page after `scroll_id`.
    async fn continue_scroll(
        &mut self,
        scroll_id: &str,
        keep_alive: Duration,
    ) -> Result<ScrollPage, CoordinatorError>;

    /// Release the scroll. Best effort.
    async fn clear_scroll(&mut self, scroll_id: &str);

    /// Release the source's resources. Always completes.
    async fn close(&mut self);

    /// Version of the source, if it is a remote cluster.
    fn remote_version(&self) -> Option<Version> {
        None
    }
}

/// Opens the [`ScrollSource`] for a worker.
///
/// A local source must honour `request.slice`; see
/// [`SliceSpec::contains`](crate::request::SliceSpec::contains).
pub trait SourceFactory: Send + Sync + fmt::Debug {
    /// A source reading `request`. `resume` is where an earlier run stopped.
    fn open(
        &self,
        request: &BulkRequest,
        worker: &Arc<WorkerState>,
        resume: Option<&WorkerResume>,
    ) -> Result<Box<dyn ScrollSource>, CoordinatorError>;
}

/// What writing one batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Documents created.
    pub created: u64,
    /// Documents updated.
    pub updated: u64,
    /// Documents deleted.
    pub deleted: u64,
    /// Documents skipped on a version conflict.
    pub version_conflicts: u64,
    /// Documents left untouched.
    pub noops: u64,
    /// Bulk requests the writer had to retry.
    pub retries: u64,
    /// Documents that failed.
    pub failures: Vec<BulkFailure>,
}

/// Writes batches of documents.
#[async_trait]
pub trait BatchSink: Send + Sync + fmt::Debug {
    /// Apply the operation of `request` to `hits`.
    async fn write(
        &self,
        request: &BulkRequest,
        hits: Vec<Hit>,
    ) -> Result<BatchOutcome, CoordinatorError>;
}
