//! The worker loop: scroll a source and write each batch.

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reflow_core::{BulkFailure, SearchFailure};
use reflow_remote::RequestContext;
use reflow_task::{BulkResponse, BulkTask, ResumeInfo, WorkerResume, WorkerState};
use tracing::{debug, info, warn};

use crate::error::CoordinatorError;
use crate::ports::{BatchOutcome, BatchSink, ScrollSource, SourceFactory, WorkerAction};
use crate::relocation::check_shutdown;
use crate::request::BulkRequest;

/// [`WorkerAction`] that pages through a [`ScrollSource`] and hands every
/// page to a [`BatchSink`].
///
/// The loop stops when the source runs dry, when a page reports search
/// failures or a timeout, when the sink reports document failures, when the
/// task is cancelled, or when the task is asked to relocate. In the last
/// case the scroll is left open and its position is returned as resume
/// data.
#[derive(Debug)]
pub struct ScrollWorker {
    sources: Arc<dyn SourceFactory>,
    sink: Arc<dyn BatchSink>,
    keep_alive: Duration,
}

#[derive(Debug, Default)]
struct Progress {
    bulk_failures: Vec<BulkFailure>,
    search_failures: Vec<SearchFailure>,
    timed_out: bool,
    resume: Option<WorkerResume>,
}

impl ScrollWorker {
    /// Create a worker keeping scrolls alive for `keep_alive`.
    pub fn new(sources: Arc<dyn SourceFactory>, sink: Arc<dyn BatchSink>, keep_alive: Duration) -> Self {
        Self {
            sources,
            sink,
            keep_alive,
        }
    }

    async fn drive(
        &self,
        task: &BulkTask,
        worker: &Arc<WorkerState>,
        request: &BulkRequest,
        resume: Option<WorkerResume>,
    ) -> Result<BulkResponse, CoordinatorError> {
        let started = Instant::now();
        let mut source = self.sources.open(request, worker, resume.as_ref())?;
        let result = self.scroll(task, worker, request, source.as_mut(), resume).await;
        source.close().await;
        let progress = result?;

        let reason = task.reason_cancelled().map(str::to_string);
        let mut response = BulkResponse::new(started.elapsed(), worker.status(reason))
            .with_failures(progress.bulk_failures, progress.search_failures)
            .with_timed_out(progress.timed_out);
        if let Some(position) = progress.resume {
            response = response.with_resume_info(ResumeInfo::for_worker(position));
        }
        Ok(response)
    }

    async fn scroll(
        &self,
        task: &BulkTask,
        worker: &WorkerState,
        request: &BulkRequest,
        source: &mut dyn ScrollSource,
        resume: Option<WorkerResume>,
    ) -> Result<Progress, CoordinatorError> {
        let mut page = match resume {
            Some(position) => {
                debug!(task = %task.id(), "continuing scroll from resume data");
                source.continue_scroll(&position.scroll_id, self.keep_alive).await?
            }
            None => {
                let page = source.start().await?;
                worker.set_total(page.total_hits);
                page
            }
        };

        let mut progress = Progress::default();
        let mut scroll_id = None;
        loop {
            scroll_id = page.scroll_id.take().or(scroll_id);
            if task.is_cancelled() {
                debug!(task = %task.id(), "worker stopping on cancellation");
                break;
            }
            if !page.failures.is_empty() || page.timed_out {
                warn!(task = %task.id(), failures = page.failures.len(), timed_out = page.timed_out, "search reported failures, stopping");
                progress.search_failures = mem::take(&mut page.failures);
                progress.timed_out = page.timed_out;
                break;
            }
            if page.hits.is_empty() {
                break;
            }

            let batch_start = Instant::now();
            let batch_size = page.hits.len() as u64;
            let outcome = self.sink.write(request, mem::take(&mut page.hits)).await?;
            apply(worker, &outcome);
            if !outcome.failures.is_empty() {
                warn!(task = %task.id(), failures = outcome.failures.len(), "bulk write reported failures, stopping");
                progress.bulk_failures = outcome.failures;
                break;
            }

            let Some(current) = scroll_id.clone() else {
                break;
            };
            if task.relocation_eligible() && check_shutdown(task)? {
                info!(task = %task.id(), "stopping worker for relocation");
                progress.resume = Some(WorkerResume {
                    scroll_id: current,
                    remote_version: source.remote_version().map(|version| version.to_string()),
                    status: worker.status(None),
                });
                return Ok(progress);
            }

            let wait = worker.throttle_wait(batch_start, batch_size, Instant::now());
            if !wait.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(wait) => worker.record_throttle(wait),
                    () = worker.cancellation_token().cancelled() => continue,
                }
            }
            page = source.continue_scroll(&current, self.keep_alive).await?;
        }

        if let Some(id) = scroll_id {
            source.clear_scroll(&id).await;
        }
        Ok(progress)
    }
}

fn apply(worker: &WorkerState, outcome: &BatchOutcome) {
    worker.count_batch();
    worker.count_created(outcome.created);
    worker.count_updated(outcome.updated);
    worker.count_deleted(outcome.deleted);
    worker.count_version_conflicts(outcome.version_conflicts);
    worker.count_noops(outcome.noops);
    for _ in 0..outcome.retries {
        worker.count_bulk_retry();
    }
}

#[async_trait]
impl WorkerAction for ScrollWorker {
    async fn run(
        &self,
        task: Arc<BulkTask>,
        worker: Arc<WorkerState>,
        request: BulkRequest,
    ) -> Result<BulkResponse, CoordinatorError> {
        let resume = request
            .resume_info
            .as_ref()
            .and_then(|resume| resume.worker.clone());
        if let Some(position) = &resume {
            worker.restore(&position.status);
        }

        let inherited = RequestContext::current().map_or_else(RequestContext::new, |context| {
            RequestContext::clone(&context)
        });
        let context = request
            .remote
            .iter()
            .flat_map(|remote| &remote.headers)
            .fold(inherited, |context, (name, value)| context.with_header(name, value));

        Arc::new(context)
            .scope(self.drive(&task, &worker, &request, resume))
            .await
    }
}
