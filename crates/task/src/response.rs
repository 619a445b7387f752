//! Final result of a bulk operation.

use std::time::Duration;

use reflow_core::{BulkFailure, SearchFailure};
use serde::{Deserialize, Serialize};

use crate::outcome::{SliceFailure, SliceOutcome};
use crate::resume::ResumeInfo;
use crate::status::Status;

/// What a finished slice produced: its response, or why it failed as a whole.
pub type SliceResult = Result<BulkResponse, SliceFailure>;

/// Response of a worker, or the merge of a leader's slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    /// Wall time the operation took.
    #[serde(rename = "took_millis", with = "crate::serde_millis")]
    pub took: Duration,
    /// Final progress.
    pub status: Status,
    /// Documents the bulk writer could not apply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bulk_failures: Vec<BulkFailure>,
    /// Shard or node failures reported while reading.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_failures: Vec<SearchFailure>,
    /// Whether any search page timed out.
    #[serde(default)]
    pub timed_out: bool,
    /// Set when the worker stopped early so another node can continue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_info: Option<ResumeInfo>,
}

impl BulkResponse {
    /// A response without failures.
    pub fn new(took: Duration, status: Status) -> Self {
        Self {
            took,
            status,
            bulk_failures: Vec::new(),
            search_failures: Vec::new(),
            timed_out: false,
            resume_info: None,
        }
    }

    /// Attach partial failures.
    #[must_use]
    pub fn with_failures(
        mut self,
        bulk_failures: Vec<BulkFailure>,
        search_failures: Vec<SearchFailure>,
    ) -> Self {
        self.bulk_failures = bulk_failures;
        self.search_failures = search_failures;
        self
    }

    /// Mark the response as timed out.
    #[must_use]
    pub fn with_timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    /// Attach resume data.
    #[must_use]
    pub fn with_resume_info(mut self, resume_info: ResumeInfo) -> Self {
        self.resume_info = Some(resume_info);
        self
    }

    /// Returns `true` if any partial failure was recorded.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.bulk_failures.is_empty() || !self.search_failures.is_empty()
    }

    /// Merge per-slice results into a leader response.
    ///
    /// `None` entries are slices that never reported. The status is
    /// [`Status::merge`] of the slots, `took` is the slowest slice, failures
    /// are concatenated in slice order and `timed_out` is set if any slice
    /// timed out.
    pub fn merge<'a, I>(slots: I, reason_cancelled: Option<String>) -> Self
    where
        I: IntoIterator<Item = Option<&'a SliceResult>>,
    {
        let mut took = Duration::ZERO;
        let mut bulk_failures = Vec::new();
        let mut search_failures = Vec::new();
        let mut timed_out = false;
        let mut outcomes = Vec::new();

        for slot in slots {
            let outcome = match slot {
                None => SliceOutcome::Pending,
                Some(Err(failure)) => SliceOutcome::Failed(failure.clone()),
                Some(Ok(response)) => {
                    took = took.max(response.took);
                    bulk_failures.extend(response.bulk_failures.iter().cloned());
                    search_failures.extend(response.search_failures.iter().cloned());
                    timed_out |= response.timed_out;
                    SliceOutcome::Completed(response.status.clone())
                }
            };
            outcomes.push(outcome);
        }

        Self {
            took,
            status: Status::merge(outcomes, reason_cancelled),
            bulk_failures,
            search_failures,
            timed_out,
            resume_info: None,
        }
    }
}
