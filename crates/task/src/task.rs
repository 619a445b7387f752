//! A bulk task and its one-way role assignment.
//!
//! A task starts [`TaskRole::Unassigned`] and moves exactly once to either
//! [`TaskRole::Leader`] (it fans out to slices and merges their results) or
//! [`TaskRole::Worker`] (it does the work itself). All role changes go
//! through a single transition function guarded by a short write lock that
//! is never held across an `.await`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::RwLock;
use reflow_core::{NodeId, TaskId};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::info::TaskInfo;
use crate::leader::LeaderState;
use crate::outcome::SliceOutcome;
use crate::status::{RequestsPerSecond, Status};
use crate::worker::WorkerState;

/// Role of a task.
#[derive(Debug, Clone, Default)]
pub enum TaskRole {
    /// No role assigned yet.
    #[default]
    Unassigned,
    /// Coordinates slices.
    Leader(Arc<LeaderState>),
    /// Does the work itself.
    Worker(Arc<WorkerState>),
}

impl TaskRole {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Leader(_) => "leader",
            Self::Worker(_) => "worker",
        }
    }
}

/// Fixed properties of a task, chosen when it is registered.
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    /// Operation name, e.g. `reindex`.
    pub action: String,
    /// Human readable description.
    pub description: String,
    /// Parent task for slice sub-tasks.
    pub parent: Option<TaskId>,
    /// Whether the task may hand its work to another node.
    pub relocation_eligible: bool,
}

impl TaskSpec {
    /// A spec for `action`.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the parent task.
    #[must_use]
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Allow or forbid relocation.
    #[must_use]
    pub fn relocation_eligible(mut self, eligible: bool) -> Self {
        self.relocation_eligible = eligible;
        self
    }
}

/// A running bulk operation.
#[derive(Debug)]
pub struct BulkTask {
    id: TaskId,
    spec: TaskSpec,
    role: RwLock<TaskRole>,
    relocation_requested: AtomicBool,
    reason_cancelled: OnceLock<String>,
    cancellation: CancellationToken,
    started: Instant,
}

impl BulkTask {
    /// Create an unassigned task with its own cancellation token.
    pub fn new(id: TaskId, spec: TaskSpec) -> Self {
        Self::with_token(id, spec, CancellationToken::new())
    }

    /// Create an unassigned task observing `cancellation`.
    pub fn with_token(id: TaskId, spec: TaskSpec, cancellation: CancellationToken) -> Self {
        Self {
            id,
            spec,
            role: RwLock::new(TaskRole::Unassigned),
            relocation_requested: AtomicBool::new(false),
            reason_cancelled: OnceLock::new(),
            cancellation,
            started: Instant::now(),
        }
    }

    /// Task id.
    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Parent task, for slice sub-tasks.
    #[must_use]
    pub fn parent(&self) -> Option<&TaskId> {
        self.spec.parent.as_ref()
    }

    /// Operation name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.spec.action
    }

    /// Current role.
    #[must_use]
    pub fn role(&self) -> TaskRole {
        self.role.read().clone()
    }

    /// Make this task a leader of `slices` slices.
    pub fn assign_leader(&self, slices: u32) -> Result<Arc<LeaderState>, TaskError> {
        let state = Arc::new(LeaderState::new(slices));
        self.transition(TaskRole::Leader(Arc::clone(&state)))?;
        tracing::debug!(task = %self.id, slices, "assigned leader role");
        Ok(state)
    }

    /// Make this task a worker.
    pub fn assign_worker(
        &self,
        requests_per_second: RequestsPerSecond,
        slice_id: Option<u32>,
    ) -> Result<Arc<WorkerState>, TaskError> {
        let state = Arc::new(WorkerState::new(
            requests_per_second,
            slice_id,
            self.cancellation.clone(),
        ));
        self.transition(TaskRole::Worker(Arc::clone(&state)))?;
        tracing::debug!(task = %self.id, slice = ?slice_id, %requests_per_second, "assigned worker role");
        Ok(state)
    }

    fn transition(&self, next: TaskRole) -> Result<(), TaskError> {
        let mut role = self.role.write();
        match &*role {
            TaskRole::Unassigned => {
                *role = next;
                Ok(())
            }
            TaskRole::Leader(_) => Err(TaskError::illegal_state(
                "task is already a leader for other slice subtasks",
            )),
            TaskRole::Worker(_) => Err(TaskError::illegal_state("task is already a worker")),
        }
    }

    /// Leader state. Fails unless the task is a leader.
    pub fn leader_state(&self) -> Result<Arc<LeaderState>, TaskError> {
        match &*self.role.read() {
            TaskRole::Leader(state) => Ok(Arc::clone(state)),
            _ => Err(TaskError::illegal_state(
                "task is not set to be a leader for other slice subtasks",
            )),
        }
    }

    /// Worker state. Fails unless the task is a worker.
    pub fn worker_state(&self) -> Result<Arc<WorkerState>, TaskError> {
        match &*self.role.read() {
            TaskRole::Worker(state) => Ok(Arc::clone(state)),
            _ => Err(TaskError::illegal_state("task is not set to be a worker")),
        }
    }

    /// Returns `true` if the task is a leader.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        matches!(&*self.role.read(), TaskRole::Leader(_))
    }

    /// Returns `true` if the task is a worker.
    #[must_use]
    pub fn is_worker(&self) -> bool {
        matches!(&*self.role.read(), TaskRole::Worker(_))
    }

    /// Progress of the task. An unassigned task reports all zeroes.
    #[must_use]
    pub fn current_status(&self) -> Status {
        let reason = self.reason_cancelled().map(str::to_string);
        match self.role() {
            TaskRole::Unassigned => Status::merge(Vec::new(), reason),
            TaskRole::Leader(state) => state.status(reason),
            TaskRole::Worker(state) => state.status(reason),
        }
    }

    /// Cancel the task. Safe in any state; the first reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.reason_cancelled.set(reason.clone()).is_err() {
            return;
        }
        tracing::info!(task = %self.id, role = self.role().name(), %reason, "task cancelled");
        self.cancellation.cancel();
        if let TaskRole::Worker(state) = self.role() {
            state.handle_cancel();
        }
    }

    /// Returns `true` once the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason_cancelled.get().is_some() || self.cancellation.is_cancelled()
    }

    /// Why the task was cancelled.
    #[must_use]
    pub fn reason_cancelled(&self) -> Option<&str> {
        self.reason_cancelled.get().map(String::as_str)
    }

    /// Token tripped when the task is cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the task may relocate. Fixed at construction.
    #[must_use]
    pub fn relocation_eligible(&self) -> bool {
        self.spec.relocation_eligible
    }

    /// Ask the task to stop and hand its work to another node.
    pub fn request_relocation(&self) -> Result<(), TaskError> {
        if !self.spec.relocation_eligible {
            return Err(TaskError::illegal_state(format!(
                "task [{}] is not eligible for relocation",
                self.id
            )));
        }
        if !self.relocation_requested.swap(true, Ordering::AcqRel) {
            tracing::info!(task = %self.id, "relocation requested");
        }
        Ok(())
    }

    /// Returns `true` once relocation was requested.
    #[must_use]
    pub fn relocation_requested(&self) -> bool {
        self.relocation_requested.load(Ordering::Acquire)
    }

    /// Monitoring view with the given status.
    #[must_use]
    pub fn task_info(&self, node: &NodeId, status: Status) -> TaskInfo {
        TaskInfo {
            node: node.clone(),
            task_id: self.id.clone(),
            parent: self.spec.parent.clone(),
            action: self.spec.action.clone(),
            description: self.spec.description.clone(),
            status,
            running_time: self.started.elapsed(),
            cancelled: self.is_cancelled(),
        }
    }

    /// Monitoring view with the current status.
    #[must_use]
    pub fn info(&self) -> TaskInfo {
        self.task_info(self.id.node(), self.current_status())
    }

    /// Aggregate view of a leader from the infos its running slices reported.
    ///
    /// Slices that already finished use their recorded result; running
    /// slices use the matching entry of `slice_infos`; the rest are pending.
    pub fn combined_info(&self, local_node: &NodeId, slice_infos: &[TaskInfo]) -> Result<TaskInfo, TaskError> {
        let leader = self.leader_state()?;
        let outcomes = (0..leader.slices())
            .map(|slice| match leader.outcome(slice)? {
                SliceOutcome::Pending => Ok(slice_infos
                    .iter()
                    .find(|info| info.status.slice_id == Some(slice))
                    .map_or(SliceOutcome::Pending, |info| {
                        SliceOutcome::Completed(info.status.clone())
                    })),
                finished => Ok(finished),
            })
            .collect::<Result<Vec<_>, TaskError>>()?;
        let status = Status::merge(outcomes, self.reason_cancelled().map(str::to_string));
        Ok(self.task_info(local_node, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::SliceFailure;
    use crate::response::BulkResponse;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn task(eligible: bool) -> BulkTask {
        BulkTask::new(
            TaskId::new("n1", 1),
            TaskSpec::new("reindex").relocation_eligible(eligible),
        )
    }

    fn msg(err: TaskError) -> String {
        match err {
            TaskError::IllegalState(msg) => msg,
            other => panic!("expected illegal state, got {other:?}"),
        }
    }

    #[test]
    fn leader_then_worker_fails() {
        let task = task(false);
        task.assign_leader(3).unwrap();
        assert!(msg(task.assign_worker(RequestsPerSecond::UNLIMITED, None).unwrap_err())
            .contains("already a leader"));
        assert!(msg(task.assign_leader(2).unwrap_err()).contains("already a leader"));
    }

    #[test]
    fn worker_then_leader_fails() {
        let task = task(false);
        task.assign_worker(RequestsPerSecond::UNLIMITED, None).unwrap();
        assert!(msg(task.assign_leader(2).unwrap_err()).contains("already a worker"));
        assert!(msg(task.assign_worker(RequestsPerSecond::UNLIMITED, None).unwrap_err())
            .contains("already a worker"));
    }

    #[test]
    fn role_state_requires_matching_role() {
        let task = task(false);
        assert!(msg(task.leader_state().unwrap_err()).contains("not set to be a leader"));
        assert!(msg(task.worker_state().unwrap_err()).contains("not set to be a worker"));

        task.assign_worker(RequestsPerSecond::UNLIMITED, Some(0)).unwrap();
        assert!(task.worker_state().is_ok());
        assert!(task.leader_state().is_err());
        assert!(task.is_worker());
    }

    #[test]
    fn unassigned_status_is_empty_merge() {
        let status = task(false).current_status();
        assert_eq!(status, Status::merge(Vec::new(), None));
    }

    #[test]
    fn cancel_is_safe_in_every_state() {
        let unassigned = task(false);
        unassigned.cancel("first");
        unassigned.cancel("second");
        assert_eq!(unassigned.reason_cancelled(), Some("first"));
        assert!(unassigned.cancellation_token().is_cancelled());

        let worker = task(false);
        let state = worker.assign_worker(RequestsPerSecond::UNLIMITED, None).unwrap();
        worker.cancel("stop");
        assert!(state.cancellation_token().is_cancelled());
        assert_eq!(worker.current_status().reason_cancelled.as_deref(), Some("stop"));

        let leader = task(false);
        leader.assign_leader(2).unwrap();
        leader.cancel("stop");
        assert!(leader.current_status().is_cancelled());
    }

    #[test]
    fn worker_assigned_after_cancel_sees_it() {
        let task = task(false);
        task.cancel("early");
        let state = task.assign_worker(RequestsPerSecond::UNLIMITED, None).unwrap();
        assert!(state.cancellation_token().is_cancelled());
    }

    #[test]
    fn relocation_requires_eligibility() {
        let ineligible = task(false);
        assert!(ineligible.request_relocation().is_err());
        assert!(!ineligible.relocation_requested());

        let eligible = task(true);
        eligible.request_relocation().unwrap();
        eligible.request_relocation().unwrap();
        assert!(eligible.relocation_requested());
    }

    #[test]
    fn combined_info_prefers_finished_slices() {
        let task = task(false);
        let leader = task.assign_leader(3).unwrap();
        leader
            .record(
                0,
                Ok(BulkResponse::new(
                    Duration::ZERO,
                    Status {
                        slice_id: Some(0),
                        total: 10,
                        ..Status::default()
                    },
                )),
            )
            .unwrap();
        leader.record(2, Err(SliceFailure::new("gone"))).unwrap();

        let node = NodeId::new("n1");
        let running = |slice: u32, total: u64| {
            task.task_info(
                &node,
                Status {
                    slice_id: Some(slice),
                    total,
                    ..Status::default()
                },
            )
        };
        let infos = vec![running(0, 99), running(1, 4)];
        let combined = task.combined_info(&node, &infos).unwrap();

        assert_eq!(combined.status.total, 14);
        assert_eq!(combined.status.slices.len(), 3);
        assert!(combined.status.slices[2].failure().is_some());
        assert_eq!(combined.node, node);
    }

    #[test]
    fn combined_info_requires_leader() {
        let task = task(false);
        assert!(task.combined_info(&NodeId::new("n1"), &[]).is_err());
    }
}
