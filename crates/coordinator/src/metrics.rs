//! Operation metrics.
//!
//! [`FacadeMetrics`] records through the `metrics` facade; whichever
//! recorder the host installs receives the values. Relocated operations are
//! never recorded here, their successor records the final outcome.

use std::fmt;
use std::time::Duration;

use reflow_task::BulkResponse;

use crate::error::CoordinatorError;

/// Operations counter, labelled by `action` and `outcome`.
pub const OPERATIONS_TOTAL: &str = "reflow_operations_total";
/// Operation duration histogram in seconds, labelled by `action`.
pub const OPERATION_DURATION_SECONDS: &str = "reflow_operation_duration_seconds";
/// Documents processed, labelled by `action` and `result`.
pub const DOCUMENTS_TOTAL: &str = "reflow_documents_total";
/// Partial failures carried in responses, labelled by `action` and `kind`.
pub const FAILURES_TOTAL: &str = "reflow_failures_total";

/// Sink for the outcome of finished operations.
pub trait BulkMetrics: Send + Sync + fmt::Debug {
    /// An operation finished with a response.
    fn record_success(&self, action: &str, response: &BulkResponse, elapsed: Duration);

    /// An operation failed as a whole.
    fn record_failure(&self, action: &str, error: &CoordinatorError, elapsed: Duration);
}

/// [`BulkMetrics`] that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl BulkMetrics for NoopMetrics {
    fn record_success(&self, _action: &str, _response: &BulkResponse, _elapsed: Duration) {}

    fn record_failure(&self, _action: &str, _error: &CoordinatorError, _elapsed: Duration) {}
}

/// [`BulkMetrics`] backed by the `metrics` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetrics;

impl FacadeMetrics {
    /// Register metric descriptions with the installed recorder.
    pub fn describe() {
        metrics::describe_counter!(OPERATIONS_TOTAL, "Finished bulk operations");
        metrics::describe_histogram!(
            OPERATION_DURATION_SECONDS,
            metrics::Unit::Seconds,
            "Wall time of finished bulk operations"
        );
        metrics::describe_counter!(DOCUMENTS_TOTAL, "Documents processed by bulk operations");
        metrics::describe_counter!(FAILURES_TOTAL, "Partial failures reported by bulk operations");
    }
}

impl BulkMetrics for FacadeMetrics {
    fn record_success(&self, action: &str, response: &BulkResponse, elapsed: Duration) {
        let action = action.to_string();
        let outcome = if response.has_failures() { "partial" } else { "success" };
        metrics::counter!(OPERATIONS_TOTAL, "action" => action.clone(), "outcome" => outcome).increment(1);
        metrics::histogram!(OPERATION_DURATION_SECONDS, "action" => action.clone()).record(elapsed.as_secs_f64());

        let status = &response.status;
        for (result, count) in [
            ("created", status.created),
            ("updated", status.updated),
            ("deleted", status.deleted),
            ("noop", status.noops),
            ("version_conflict", status.version_conflicts),
        ] {
            if count > 0 {
                metrics::counter!(DOCUMENTS_TOTAL, "action" => action.clone(), "result" => result)
                    .increment(count);
            }
        }
        for (kind, count) in [
            ("bulk", response.bulk_failures.len()),
            ("search", response.search_failures.len()),
        ] {
            if count > 0 {
                metrics::counter!(FAILURES_TOTAL, "action" => action.clone(), "kind" => kind)
                    .increment(count as u64);
            }
        }
    }

    fn record_failure(&self, action: &str, error: &CoordinatorError, elapsed: Duration) {
        let action = action.to_string();
        let outcome = match error {
            CoordinatorError::Cancelled(_) => "cancelled",
            _ => "failure",
        };
        metrics::counter!(OPERATIONS_TOTAL, "action" => action.clone(), "outcome" => outcome).increment(1);
        metrics::histogram!(OPERATION_DURATION_SECONDS, "action" => action).record(elapsed.as_secs_f64());
    }
}
