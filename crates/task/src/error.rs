//! Task error types.

use reflow_core::TaskId;
use thiserror::Error;

/// Errors raised by the task model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// A progress counter was negative.
    #[error("{field} must be greater than or equal to 0 but was [{value}]")]
    Validation {
        /// Name of the offending counter.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// The requests-per-second value is not a positive rate.
    #[error("requests_per_second must be greater than 0 or -1 for unlimited but was [{0}]")]
    InvalidRequestsPerSecond(String),

    /// The task was used in a way its current role does not allow.
    #[error("illegal task state: {0}")]
    IllegalState(String),

    /// A slice id outside `0..slices` was reported.
    #[error("slice [{slice}] is out of range for a leader of [{slices}] slices")]
    SliceOutOfRange {
        /// Reported slice id.
        slice: u32,
        /// Number of slices the leader coordinates.
        slices: u32,
    },

    /// A slice outcome was reported twice.
    #[error("slice [{0}] already has a recorded outcome")]
    SliceAlreadyRecorded(u32),

    /// Resume data does not fit the request it was attached to.
    #[error("invalid resume info: {0}")]
    InvalidResume(String),

    /// No task with this id is registered.
    #[error("task [{0}] not found")]
    TaskNotFound(TaskId),
}

impl TaskError {
    /// Shorthand for [`TaskError::IllegalState`].
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }
}
