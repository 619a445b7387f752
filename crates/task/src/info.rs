//! Monitoring view of a task.

use std::time::Duration;

use reflow_core::{NodeId, TaskId};
use serde::{Deserialize, Serialize};

use crate::status::Status;

/// What monitoring reports about a running task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Node the task runs on.
    pub node: NodeId,
    /// Task id.
    pub task_id: TaskId,
    /// Parent task of a slice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TaskId>,
    /// Operation name.
    pub action: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
    /// Progress.
    pub status: Status,
    /// Time since the task started.
    #[serde(rename = "running_time_millis", with = "crate::serde_millis")]
    pub running_time: Duration,
    /// Whether the task was cancelled.
    #[serde(default)]
    pub cancelled: bool,
}
