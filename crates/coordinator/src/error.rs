//! Coordinator error types.

use std::fmt;

use reflow_core::TaskId;
use reflow_remote::RemoteError;
use reflow_resilience::ConfigError;
use reflow_task::{SliceFailure, TaskError};
use serde::{Deserialize, Serialize};

/// Where a relocated task went.
///
/// Returned instead of a response when a task handed its remaining work to
/// another node. Clients keep polling `relocated` from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationSignal {
    /// The task that stopped.
    pub original: TaskId,
    /// The task that continues its work.
    pub relocated: TaskId,
}

impl fmt::Display for RelocationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task [{}] was relocated and continues as [{}]",
            self.original, self.relocated
        )
    }
}

/// Errors from coordinating a bulk operation.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Task state misuse or invalid task data.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Talking to the remote source failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An operation was attempted in a state that does not allow it.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The request cannot be executed as given.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Sending a request to another task or node failed.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// The task handed its work to another node.
    #[error("{0}")]
    Relocated(RelocationSignal),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The task was cancelled before it produced a response.
    #[error("task cancelled: {0}")]
    Cancelled(String),
}

impl CoordinatorError {
    /// Shorthand for [`CoordinatorError::IllegalState`].
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// The relocation signal, if the task was relocated.
    #[must_use]
    pub fn relocation(&self) -> Option<&RelocationSignal> {
        match self {
            Self::Relocated(signal) => Some(signal),
            _ => None,
        }
    }

    /// Status code that best describes the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote(error) => error.status(),
            Self::InvalidRequest(_) | Self::Task(TaskError::Validation { .. } | TaskError::InvalidResume(_)) => {
                Some(400)
            }
            Self::Task(TaskError::TaskNotFound(_)) => Some(404),
            Self::Cancelled(_) => Some(499),
            _ => None,
        }
    }

    /// Record this error as the failure of a whole slice.
    #[must_use]
    pub fn to_slice_failure(&self) -> SliceFailure {
        let failure = SliceFailure::from_error(self);
        match self.status() {
            Some(status) => failure.with_status(status),
            None => failure,
        }
    }
}

impl From<ConfigError> for CoordinatorError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}
