//! In-memory collaborators shared by the coordinator integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reflow_coordinator::{
    BatchOutcome, BatchSink, BulkMetrics, BulkRequest, ClusterClient, Collaborators,
    CoordinatorConfig, CoordinatorError, Orchestrator, RemoteClientFactory, RemoteInfo,
    ResumeRequest, ScrollSource, ShardTopology, SourceFactory, WorkerAction,
};
use reflow_core::{BulkFailure, ClusterSnapshot, DiscoveryNode, SharedCluster, TaskId};
use reflow_remote::{Hit, RemoteRequest, RemoteResponse, RemoteTransport, ScrollPage, TransportError};
use reflow_task::{BulkResponse, BulkTask, Status, TaskRegistry, WorkerResume, WorkerState};

pub const LOCAL: &str = "a";

pub fn cluster() -> Arc<SharedCluster> {
    Arc::new(SharedCluster::new(
        ClusterSnapshot::single(LOCAL)
            .with_node(DiscoveryNode::new("b"))
            .with_node(DiscoveryNode::new("c")),
    ))
}

pub fn status(total: i64, created: i64) -> Status {
    Status::builder().total(total).created(created).build().unwrap()
}

pub fn response(total: i64, created: i64) -> BulkResponse {
    BulkResponse::new(Duration::from_millis(10), status(total, created))
}

pub fn doc_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("doc-{i}")).collect()
}

#[derive(Debug)]
pub struct Topology(pub Vec<u32>);

impl ShardTopology for Topology {
    fn shard_counts(&self, _indices: &[String]) -> Result<Vec<u32>, CoordinatorError> {
        Ok(self.0.clone())
    }
}

/// Client answering every slice with ten created documents, failing the
/// listed slices, and recording what it was sent.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    pub slices: Mutex<Vec<BulkRequest>>,
    pub resumes: Mutex<Vec<(String, ResumeRequest)>>,
    pub failing_slices: Vec<u32>,
    pub relocated_to: Option<TaskId>,
}

impl ScriptedClient {
    pub fn dispatched(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .slices
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.slice.as_ref().unwrap().id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn resumes(&self) -> Vec<(String, ResumeRequest)> {
        self.resumes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterClient for ScriptedClient {
    async fn execute_slice(&self, request: BulkRequest) -> Result<BulkResponse, CoordinatorError> {
        let slice = request.slice.as_ref().unwrap().id;
        self.slices.lock().unwrap().push(request);
        if self.failing_slices.contains(&slice) {
            return Err(CoordinatorError::Dispatch(format!("slice [{slice}] lost its node")));
        }
        let mut status = status(10, 10);
        status.slice_id = Some(slice);
        Ok(BulkResponse::new(Duration::from_millis(5), status))
    }

    async fn resume_on(
        &self,
        node: &DiscoveryNode,
        request: ResumeRequest,
    ) -> Result<TaskId, CoordinatorError> {
        self.resumes
            .lock()
            .unwrap()
            .push((node.id.as_str().to_string(), request));
        self.relocated_to
            .clone()
            .ok_or_else(|| CoordinatorError::Dispatch("resume refused".into()))
    }
}

/// Worker action returning a fixed response and recording its requests.
#[derive(Debug)]
pub struct FixedAction {
    pub response: BulkResponse,
    pub requests: Mutex<Vec<BulkRequest>>,
}

impl FixedAction {
    pub fn new(response: BulkResponse) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkerAction for FixedAction {
    async fn run(
        &self,
        _task: Arc<BulkTask>,
        _worker: Arc<WorkerState>,
        request: BulkRequest,
    ) -> Result<BulkResponse, CoordinatorError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.response.clone())
    }
}

/// Remote transport answering the version probe.
#[derive(Debug)]
pub struct VersionTransport {
    version: String,
    probes: AtomicUsize,
}

#[async_trait]
impl RemoteTransport for VersionTransport {
    async fn perform(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        assert_eq!(request.path, "/");
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(RemoteResponse::json(
            200,
            format!(r#"{{"version":{{"number":"{}"}}}}"#, self.version),
        ))
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct Remotes(Arc<VersionTransport>);

impl Remotes {
    pub fn version(version: &str) -> Self {
        Self(Arc::new(VersionTransport {
            version: version.to_string(),
            probes: AtomicUsize::new(0),
        }))
    }

    pub fn probes(&self) -> usize {
        self.0.probes.load(Ordering::SeqCst)
    }
}

impl RemoteClientFactory for Remotes {
    fn client(&self, _remote: &RemoteInfo) -> Result<Arc<dyn RemoteTransport>, CoordinatorError> {
        Ok(Arc::clone(&self.0) as Arc<dyn RemoteTransport>)
    }
}

#[derive(Debug, Default)]
pub struct RecordingMetrics {
    pub successes: Mutex<Vec<String>>,
    pub failures: Mutex<Vec<String>>,
}

impl RecordingMetrics {
    pub fn recorded(&self) -> usize {
        self.successes.lock().unwrap().len() + self.failures.lock().unwrap().len()
    }
}

impl BulkMetrics for RecordingMetrics {
    fn record_success(&self, action: &str, _response: &BulkResponse, _elapsed: Duration) {
        self.successes.lock().unwrap().push(action.to_string());
    }

    fn record_failure(&self, action: &str, error: &CoordinatorError, _elapsed: Duration) {
        self.failures.lock().unwrap().push(format!("{action}: {error}"));
    }
}

/// What the memory sources were asked to do.
#[derive(Debug, Default)]
pub struct SourceLog {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub cleared: Mutex<Vec<String>>,
    pub continued_from: Mutex<Vec<String>>,
}

impl SourceLog {
    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }

    pub fn continued_from(&self) -> Vec<String> {
        self.continued_from.lock().unwrap().clone()
    }
}

/// Pages over a fixed list of document ids. Scroll ids are `scroll-N`,
/// where `N` is the offset of the next page.
#[derive(Debug)]
pub struct MemorySource {
    docs: Vec<String>,
    size: usize,
    log: Arc<SourceLog>,
}

impl MemorySource {
    fn page(&self, offset: usize) -> ScrollPage {
        let start = offset.min(self.docs.len());
        let end = (start + self.size).min(self.docs.len());
        let hits = self.docs[start..end]
            .iter()
            .map(|id| Hit {
                index: "src".into(),
                id: id.clone(),
                version: None,
                routing: None,
                source: Some(serde_json::json!({ "id": id })),
            })
            .collect();
        ScrollPage {
            scroll_id: Some(format!("scroll-{end}")),
            timed_out: false,
            total_hits: self.docs.len() as u64,
            hits,
            failures: Vec::new(),
        }
    }
}

#[async_trait]
impl ScrollSource for MemorySource {
    async fn start(&mut self) -> Result<ScrollPage, CoordinatorError> {
        Ok(self.page(0))
    }

    async fn continue_scroll(
        &mut self,
        scroll_id: &str,
        _keep_alive: Duration,
    ) -> Result<ScrollPage, CoordinatorError> {
        self.log
            .continued_from
            .lock()
            .unwrap()
            .push(scroll_id.to_string());
        let offset = scroll_id
            .strip_prefix("scroll-")
            .and_then(|offset| offset.parse().ok())
            .ok_or_else(|| CoordinatorError::InvalidRequest(format!("unknown scroll [{scroll_id}]")))?;
        Ok(self.page(offset))
    }

    async fn clear_scroll(&mut self, scroll_id: &str) {
        self.log.cleared.lock().unwrap().push(scroll_id.to_string());
    }

    async fn close(&mut self) {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opens [`MemorySource`]s over the documents that fall into the request's
/// slice.
#[derive(Debug)]
pub struct MemorySources {
    pub docs: Vec<String>,
    pub log: Arc<SourceLog>,
}

impl MemorySources {
    pub fn new(docs: Vec<String>) -> Self {
        Self {
            docs,
            log: Arc::new(SourceLog::default()),
        }
    }
}

impl SourceFactory for MemorySources {
    fn open(
        &self,
        request: &BulkRequest,
        _worker: &Arc<WorkerState>,
        _resume: Option<&WorkerResume>,
    ) -> Result<Box<dyn ScrollSource>, CoordinatorError> {
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        let docs = self
            .docs
            .iter()
            .filter(|id| request.slice.as_ref().is_none_or(|slice| slice.contains(id)))
            .cloned()
            .collect();
        Ok(Box::new(MemorySource {
            docs,
            size: request.batch_size as usize,
            log: Arc::clone(&self.log),
        }))
    }
}

/// Sink recording written ids. It can fail one id, or mark the local node
/// as shutting down after a number of batches.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub written: Mutex<Vec<String>>,
    pub batches: AtomicU64,
    pub fail_id: Option<String>,
    pub shutdown_after: Option<(u64, Arc<SharedCluster>)>,
}

impl MemorySink {
    pub fn written(&self) -> Vec<String> {
        let mut ids = self.written.lock().unwrap().clone();
        ids.sort();
        ids
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchSink for MemorySink {
    async fn write(
        &self,
        _request: &BulkRequest,
        hits: Vec<Hit>,
    ) -> Result<BatchOutcome, CoordinatorError> {
        let mut outcome = BatchOutcome::default();
        for hit in hits {
            if self.fail_id.as_ref() == Some(&hit.id) {
                outcome.failures.push(BulkFailure {
                    index: "dest".into(),
                    id: hit.id,
                    cause: "mapper_parsing_exception".into(),
                    status: 400,
                });
                continue;
            }
            self.written.lock().unwrap().push(hit.id);
            outcome.created += 1;
        }
        let batches = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, cluster)) = &self.shutdown_after {
            if batches == *after {
                cluster.update(|snapshot| snapshot.with_shutting_down(LOCAL));
            }
        }
        Ok(outcome)
    }
}

/// Builds an [`Orchestrator`] over fakes; fields may be swapped before
/// [`build`](Self::build).
pub struct Harness {
    pub cluster: Arc<SharedCluster>,
    pub topology: Vec<u32>,
    pub client: Arc<dyn ClusterClient>,
    pub action: Arc<dyn WorkerAction>,
    pub remotes: Arc<dyn RemoteClientFactory>,
    pub metrics: Arc<RecordingMetrics>,
    pub config: CoordinatorConfig,
}

impl Harness {
    pub fn new(client: Arc<dyn ClusterClient>, action: Arc<dyn WorkerAction>) -> Self {
        Self {
            cluster: cluster(),
            topology: vec![1],
            client,
            action,
            remotes: Arc::new(Remotes::version("7.17.0")),
            metrics: Arc::new(RecordingMetrics::default()),
            config: CoordinatorConfig::default(),
        }
    }

    pub fn build(self) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            Arc::new(TaskRegistry::new(LOCAL)),
            self.config,
            Collaborators {
                cluster: self.cluster,
                topology: Arc::new(Topology(self.topology)),
                client: self.client,
                action: self.action,
                remotes: self.remotes,
                metrics: self.metrics,
            },
        ))
    }
}
