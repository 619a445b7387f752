//! State of a task that coordinates slices.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::TaskError;
use crate::outcome::SliceOutcome;
use crate::response::{BulkResponse, SliceResult};
use crate::resume::{ResumeInfo, SliceResume};
use crate::status::Status;

/// One write-once result slot per slice.
///
/// Each slot is written by the completion of exactly one slice, so slots
/// never contend with each other; `OnceLock` only has to publish the write.
#[derive(Debug)]
pub struct LeaderState {
    slices: u32,
    results: Box<[OnceLock<SliceResult>]>,
}

impl LeaderState {
    /// Create a leader for `slices` slices.
    pub fn new(slices: u32) -> Self {
        Self {
            slices,
            results: (0..slices).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Number of slices.
    #[must_use]
    pub fn slices(&self) -> u32 {
        self.slices
    }

    /// Record the result of `slice`. Each slot accepts one write.
    pub fn record(&self, slice: u32, result: SliceResult) -> Result<(), TaskError> {
        let slot = self.slot(slice)?;
        slot.set(result)
            .map_err(|_| TaskError::SliceAlreadyRecorded(slice))?;
        tracing::debug!(slice, finished = self.finished(), slices = self.slices, "slice finished");
        Ok(())
    }

    /// The recorded result of `slice`, if it has finished.
    pub fn result(&self, slice: u32) -> Result<Option<&SliceResult>, TaskError> {
        Ok(self.slot(slice)?.get())
    }

    /// The slot of `slice` as an outcome.
    pub fn outcome(&self, slice: u32) -> Result<SliceOutcome, TaskError> {
        Ok(to_outcome(self.slot(slice)?.get()))
    }

    /// All slots in slice order.
    #[must_use]
    pub fn outcomes(&self) -> Vec<SliceOutcome> {
        self.results.iter().map(|slot| to_outcome(slot.get())).collect()
    }

    /// Merged status of the finished slices.
    #[must_use]
    pub fn status(&self, reason_cancelled: Option<String>) -> Status {
        Status::merge(self.outcomes(), reason_cancelled)
    }

    /// Number of slices that have a result.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.results.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Results of the slices that finished, by slice id.
    pub fn finished_responses(&self) -> impl Iterator<Item = (u32, &SliceResult)> + '_ {
        self.results
            .iter()
            .zip(0u32..)
            .filter_map(|(slot, id)| slot.get().map(|result| (id, result)))
    }

    /// Returns `true` once every slice has a result.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.finished() == self.results.len()
    }

    /// Merge all slice results into the leader's response.
    #[must_use]
    pub fn response(&self, reason_cancelled: Option<String>) -> BulkResponse {
        BulkResponse::merge(self.results.iter().map(OnceLock::get), reason_cancelled)
    }

    /// Snapshot of which slices finished, for continuing elsewhere.
    #[must_use]
    pub fn resume_info(&self) -> ResumeInfo {
        let slices = self
            .results
            .iter()
            .zip(0u32..)
            .map(|(slot, id)| {
                let state = match slot.get() {
                    Some(result) => SliceResume::finished(result.clone()),
                    None => SliceResume::Incomplete { worker: None },
                };
                (id, state)
            })
            .collect::<BTreeMap<_, _>>();
        ResumeInfo::for_slices(self.slices, slices)
    }

    fn slot(&self, slice: u32) -> Result<&OnceLock<SliceResult>, TaskError> {
        self.results
            .get(slice as usize)
            .ok_or(TaskError::SliceOutOfRange {
                slice,
                slices: self.slices,
            })
    }
}

fn to_outcome(result: Option<&SliceResult>) -> SliceOutcome {
    match result {
        None => SliceOutcome::Pending,
        Some(Ok(response)) => SliceOutcome::Completed(response.status.clone()),
        Some(Err(failure)) => SliceOutcome::Failed(failure.clone()),
    }
}
