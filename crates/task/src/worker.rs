//! State of a task that does the scrolling and writing itself.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reflow_core::NodeId;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::status::{RequestsPerSecond, Status};

/// Lazily picked node a worker hands its remaining work to.
///
/// Implementations must be sticky: once [`pick`](Self::pick) returns a node,
/// every later call returns the same node.
pub trait RelocationTarget: Send + Sync + fmt::Debug {
    /// Pick a target if one is available, or return the one already picked.
    fn pick(&self) -> Option<NodeId>;

    /// The node picked so far, without trying to pick.
    fn picked(&self) -> Option<NodeId>;
}

/// Live progress counters of a worker.
///
/// Counters are plain atomics. The worker loop is the only writer, monitoring
/// reads them concurrently and may see a batch half-applied.
pub struct WorkerState {
    slice_id: Option<u32>,
    total: AtomicU64,
    updated: AtomicU64,
    created: AtomicU64,
    deleted: AtomicU64,
    batches: AtomicU64,
    version_conflicts: AtomicU64,
    noops: AtomicU64,
    bulk_retries: AtomicU64,
    search_retries: AtomicU64,
    throttled_nanos: AtomicU64,
    requests_per_second: AtomicU32,
    throttled_until: Mutex<Option<Instant>>,
    relocation_target: OnceLock<Arc<dyn RelocationTarget>>,
    cancellation: CancellationToken,
}

impl WorkerState {
    /// Create worker state observing `cancellation`.
    pub fn new(
        requests_per_second: RequestsPerSecond,
        slice_id: Option<u32>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            slice_id,
            total: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            created: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            version_conflicts: AtomicU64::new(0),
            noops: AtomicU64::new(0),
            bulk_retries: AtomicU64::new(0),
            search_retries: AtomicU64::new(0),
            throttled_nanos: AtomicU64::new(0),
            requests_per_second: AtomicU32::new(requests_per_second.get().to_bits()),
            throttled_until: Mutex::new(None),
            relocation_target: OnceLock::new(),
            cancellation,
        }
    }

    /// Slice this worker processes, if it is a slice.
    #[must_use]
    pub fn slice_id(&self) -> Option<u32> {
        self.slice_id
    }

    /// Set the expected number of documents.
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Count one processed batch.
    pub fn count_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Count created documents.
    pub fn count_created(&self, n: u64) {
        self.created.fetch_add(n, Ordering::Relaxed);
    }

    /// Count updated documents.
    pub fn count_updated(&self, n: u64) {
        self.updated.fetch_add(n, Ordering::Relaxed);
    }

    /// Count deleted documents.
    pub fn count_deleted(&self, n: u64) {
        self.deleted.fetch_add(n, Ordering::Relaxed);
    }

    /// Count version conflicts.
    pub fn count_version_conflicts(&self, n: u64) {
        self.version_conflicts.fetch_add(n, Ordering::Relaxed);
    }

    /// Count no-op documents.
    pub fn count_noops(&self, n: u64) {
        self.noops.fetch_add(n, Ordering::Relaxed);
    }

    /// Count one retried bulk request.
    pub fn count_bulk_retry(&self) {
        self.bulk_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one retried search request.
    pub fn count_search_retry(&self) {
        self.search_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Current throttle.
    #[must_use]
    pub fn requests_per_second(&self) -> RequestsPerSecond {
        let value = f32::from_bits(self.requests_per_second.load(Ordering::Relaxed));
        RequestsPerSecond::new(value).unwrap_or_default()
    }

    /// Change the throttle. Applies from the next batch on.
    pub fn rethrottle(&self, requests_per_second: RequestsPerSecond) {
        self.requests_per_second
            .store(requests_per_second.get().to_bits(), Ordering::Relaxed);
        tracing::debug!(
            slice = ?self.slice_id,
            %requests_per_second,
            "worker rethrottled"
        );
    }

    /// How long to wait before the next batch so that a batch of
    /// `batch_size` documents started at `last_batch_start` respects the
    /// throttle. Records the deadline for status reporting.
    pub fn throttle_wait(&self, last_batch_start: Instant, batch_size: u64, now: Instant) -> Duration {
        let rps = self.requests_per_second();
        if rps.is_unlimited() || batch_size == 0 {
            *self.throttled_until.lock() = None;
            return Duration::ZERO;
        }
        let perfect = Duration::from_secs_f64(batch_size as f64 / f64::from(rps.get()));
        let wait = (last_batch_start + perfect).saturating_duration_since(now);
        *self.throttled_until.lock() = (!wait.is_zero()).then(|| now + wait);
        wait
    }

    /// Add time actually spent waiting on the throttle.
    pub fn record_throttle(&self, waited: Duration) {
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.throttled_nanos.fetch_add(nanos, Ordering::Relaxed);
        *self.throttled_until.lock() = None;
    }

    /// Token the worker loop must observe.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Called when the owning task is cancelled. Drops any pending throttle
    /// deadline so a sleeping worker wakes and notices the cancellation.
    pub fn handle_cancel(&self) {
        *self.throttled_until.lock() = None;
        self.cancellation.cancel();
        tracing::debug!(slice = ?self.slice_id, "worker cancelled");
    }

    /// Install the relocation target. Only one target can be installed.
    pub fn install_relocation_target(&self, target: Arc<dyn RelocationTarget>) -> Result<(), TaskError> {
        self.relocation_target
            .set(target)
            .map_err(|_| TaskError::illegal_state("relocation target is already installed"))
    }

    /// The installed relocation target.
    #[must_use]
    pub fn relocation_target(&self) -> Option<&Arc<dyn RelocationTarget>> {
        self.relocation_target.get()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn status(&self, reason_cancelled: Option<String>) -> Status {
        let throttled_until = self
            .throttled_until
            .lock()
            .map_or(Duration::ZERO, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
        Status {
            slice_id: self.slice_id,
            total: self.total.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            version_conflicts: self.version_conflicts.load(Ordering::Relaxed),
            noops: self.noops.load(Ordering::Relaxed),
            bulk_retries: self.bulk_retries.load(Ordering::Relaxed),
            search_retries: self.search_retries.load(Ordering::Relaxed),
            throttled: Duration::from_nanos(self.throttled_nanos.load(Ordering::Relaxed)),
            requests_per_second: self.requests_per_second(),
            reason_cancelled,
            throttled_until,
            slices: Vec::new(),
        }
    }

    /// Seed the counters from a status recorded before a relocation.
    pub fn restore(&self, status: &Status) {
        self.total.store(status.total, Ordering::Relaxed);
        self.updated.store(status.updated, Ordering::Relaxed);
        self.created.store(status.created, Ordering::Relaxed);
        self.deleted.store(status.deleted, Ordering::Relaxed);
        self.batches.store(status.batches, Ordering::Relaxed);
        self.version_conflicts
            .store(status.version_conflicts, Ordering::Relaxed);
        self.noops.store(status.noops, Ordering::Relaxed);
        self.bulk_retries.store(status.bulk_retries, Ordering::Relaxed);
        self.search_retries
            .store(status.search_retries, Ordering::Relaxed);
        let nanos = u64::try_from(status.throttled.as_nanos()).unwrap_or(u64::MAX);
        self.throttled_nanos.store(nanos, Ordering::Relaxed);
    }
}

impl fmt::Debug for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerState")
            .field("slice_id", &self.slice_id)
            .field("batches", &self.batches.load(Ordering::Relaxed))
            .field("requests_per_second", &self.requests_per_second())
            .field("relocation_target", &self.relocation_target.get())
            .finish_non_exhaustive()
    }
}
