#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Reflow Task
//!
//! Task-level state for sliced bulk operations:
//!
//! - [`Status`] and [`StatusBuilder`]: validated progress counters and the
//!   slice merge rule ([`Status::merge`])
//! - [`SliceOutcome`]: the pending / completed / failed slot of one slice
//! - [`BulkTask`] and [`TaskRole`]: one-way role assignment to leader or worker
//! - [`LeaderState`]: write-once result slots, one per slice
//! - [`WorkerState`]: live counters, throttling and the relocation target
//! - [`ResumeInfo`]: what a successor needs to continue an interrupted task
//! - [`TaskRegistry`]: node-local task ids, lookup and cancellation

pub mod error;
pub mod info;
pub mod leader;
pub mod outcome;
pub mod registry;
pub mod response;
pub mod resume;
pub mod status;
pub mod task;
pub mod worker;

pub use error::TaskError;
pub use info::TaskInfo;
pub use leader::LeaderState;
pub use outcome::{SliceFailure, SliceOutcome};
pub use registry::TaskRegistry;
pub use response::{BulkResponse, SliceResult};
pub use resume::{ResumeInfo, SliceResume, WorkerResume};
pub use status::{RequestsPerSecond, Status, StatusBuilder, UNLIMITED_WIRE_VALUE};
pub use task::{BulkTask, TaskRole, TaskSpec};
pub use worker::{RelocationTarget, WorkerState};

/// Serde helper for `Duration` serialized as milliseconds.
pub(crate) mod serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serialize a `Duration` as an integer of milliseconds.
    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(s)
    }

    /// Deserialize an integer of milliseconds into a `Duration`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
