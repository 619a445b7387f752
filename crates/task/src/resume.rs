//! Resume data handed from a relocating task to its successor.
//!
//! A single worker that stops early records where its scroll was
//! ([`WorkerResume`]). A sliced operation records, per slice, whether the
//! slice finished and with what result ([`SliceResume`]), so the successor
//! only dispatches the slices that still have work left.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::outcome::SliceFailure;
use crate::response::{BulkResponse, SliceResult};
use crate::status::Status;

/// Where a single worker stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResume {
    /// Scroll continuation token.
    pub scroll_id: String,
    /// Version of the remote source, if the source is remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_version: Option<String>,
    /// Progress made so far.
    pub status: Status,
}

/// Resume state of one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SliceResume {
    /// The slice finished with this response.
    Completed {
        /// The recorded response.
        response: BulkResponse,
    },
    /// The slice failed as a whole.
    Failed {
        /// The recorded failure.
        error: SliceFailure,
    },
    /// The slice still has work to do.
    Incomplete {
        /// Where its worker stopped, if it had started.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker: Option<WorkerResume>,
    },
}

impl SliceResume {
    /// Record a finished slice.
    pub fn finished(result: SliceResult) -> Self {
        match result {
            Ok(response) => Self::Completed { response },
            Err(error) => Self::Failed { error },
        }
    }

    /// The recorded result if the slice finished.
    #[must_use]
    pub fn result(&self) -> Option<SliceResult> {
        match self {
            Self::Completed { response } => Some(Ok(response.clone())),
            Self::Failed { error } => Some(Err(error.clone())),
            Self::Incomplete { .. } => None,
        }
    }

    /// Returns `true` if the slice finished, successfully or not.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Incomplete { .. })
    }
}

/// Snapshot used to continue an interrupted operation elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeInfo {
    /// Slice count of the interrupted operation.
    pub total_slices: u32,
    /// Per-slice state of a sliced operation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slices: BTreeMap<u32, SliceResume>,
    /// Worker position of an unsliced operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerResume>,
}

impl ResumeInfo {
    /// Resume data for a single worker.
    pub fn for_worker(worker: WorkerResume) -> Self {
        Self {
            total_slices: 1,
            slices: BTreeMap::new(),
            worker: Some(worker),
        }
    }

    /// Resume data for a sliced operation.
    pub fn for_slices(total_slices: u32, slices: BTreeMap<u32, SliceResume>) -> Self {
        Self {
            total_slices,
            slices,
            worker: None,
        }
    }

    /// The recorded result of `slice`, if it finished.
    #[must_use]
    pub fn completed(&self, slice: u32) -> Option<SliceResult> {
        self.slices.get(&slice).and_then(SliceResume::result)
    }

    /// Ids of slices that still have work to do.
    pub fn pending_slices(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.total_slices).filter(|id| !self.slices.get(id).is_some_and(SliceResume::is_finished))
    }

    /// Check that this snapshot can resume an operation of `slices` slices.
    pub fn validate(&self, slices: u32) -> Result<(), TaskError> {
        if self.total_slices != slices {
            return Err(TaskError::InvalidResume(format!(
                "resume info has [{}] slices but the request has [{slices}]",
                self.total_slices
            )));
        }
        if let Some(id) = self.slices.keys().find(|id| **id >= self.total_slices) {
            return Err(TaskError::InvalidResume(format!(
                "slice [{id}] is out of range for [{}] slices",
                self.total_slices
            )));
        }
        if self.total_slices > 1 && self.worker.is_some() {
            return Err(TaskError::InvalidResume(
                "a sliced operation cannot carry a single worker position".to_string(),
            ));
        }
        Ok(())
    }
}
