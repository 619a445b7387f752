//! Slice planning and fan-out.
//!
//! Decides how many slices a request runs as, gives the task its role, and
//! for a leader splits the request into one sub-request per slice. Slices
//! that already finished in an earlier run are recorded from the resume
//! data and never sent again.

use std::sync::Arc;

use futures::future::join_all;
use reflow_task::{BulkResponse, BulkTask, LeaderState, ResumeInfo, SliceResume, TaskError, TaskRole};
use tracing::{debug, warn};

use crate::error::CoordinatorError;
use crate::ports::{ClusterClient, ShardTopology};
use crate::request::{BulkRequest, SliceSpec, Slices};

/// Upper bound on the slice count chosen by [`Slices::Auto`].
pub const AUTO_SLICE_CAP: u32 = 20;

/// Number of slices `request` runs as.
///
/// A resumed request reuses the count it was recorded with. `Auto` takes the
/// smallest primary shard count of the source indices (1 without indices),
/// capped at [`AUTO_SLICE_CAP`].
pub fn resolve_slice_count(
    request: &BulkRequest,
    topology: &dyn ShardTopology,
) -> Result<u32, CoordinatorError> {
    if let Some(resume) = &request.resume_info {
        return Ok(resume.total_slices);
    }
    match request.slices {
        Slices::Fixed(slices) => Ok(slices),
        Slices::Auto => {
            let counts = topology.shard_counts(&request.indices)?;
            let slices = counts.into_iter().min().unwrap_or(1).clamp(1, AUTO_SLICE_CAP);
            debug!(indices = ?request.indices, slices, "resolved automatic slice count");
            Ok(slices)
        }
    }
}

/// Give `task` its role for `request`: a leader for more than one slice,
/// otherwise a worker.
pub fn init_role(
    task: &BulkTask,
    request: &BulkRequest,
    topology: &dyn ShardTopology,
) -> Result<TaskRole, CoordinatorError> {
    let slices = resolve_slice_count(request, topology)?;
    if slices > 1 {
        task.assign_leader(slices)?;
    } else {
        let slice_id = request.slice.as_ref().map(|slice| slice.id);
        task.assign_worker(request.requests_per_second, slice_id)?;
    }
    Ok(task.role())
}

/// One sub-request per slice of a leader task.
///
/// Each sub-request reads its own partition, gets an equal share of the
/// throttle and names `task` as its parent. A slice that stopped half-way
/// in an earlier run carries that run's worker position.
pub fn partition(task: &BulkTask, request: &BulkRequest, slices: u32) -> Vec<BulkRequest> {
    (0..slices)
        .map(|id| {
            let mut sub = request.clone();
            sub.slices = Slices::Fixed(1);
            sub.slice = Some(SliceSpec::new(id, slices));
            sub.requests_per_second = request.requests_per_second.per_slice(slices);
            sub.parent_task = Some(task.id().clone());
            sub.resume_info = request
                .resume_info
                .as_ref()
                .and_then(|resume| slice_worker_resume(resume, id));
            sub
        })
        .collect()
}

fn slice_worker_resume(resume: &ResumeInfo, slice: u32) -> Option<ResumeInfo> {
    match resume.slices.get(&slice)? {
        SliceResume::Incomplete { worker: Some(worker) } => {
            Some(ResumeInfo::for_worker(worker.clone()))
        }
        _ => None,
    }
}

/// Run every slice of a leader and merge their results.
///
/// Slices finished in an earlier run are recorded without dispatch; the
/// rest run concurrently, each writing its own slot as soon as it finishes.
/// A failed slice is recorded and does not stop its siblings.
pub async fn fan_out(
    task: &BulkTask,
    leader: &Arc<LeaderState>,
    request: &BulkRequest,
    client: &dyn ClusterClient,
) -> Result<BulkResponse, CoordinatorError> {
    let mut dispatched = Vec::new();
    for sub in partition(task, request, leader.slices()) {
        let slice = sub.slice.as_ref().map_or(0, |slice| slice.id);
        if let Some(recorded) = request
            .resume_info
            .as_ref()
            .and_then(|resume| resume.completed(slice))
        {
            debug!(task = %task.id(), slice, "slice already finished, using recorded result");
            leader.record(slice, recorded)?;
            continue;
        }
        dispatched.push(async move {
            let result = client.execute_slice(sub).await.map_err(|error| {
                warn!(slice, %error, "slice failed");
                error.to_slice_failure()
            });
            leader.record(slice, result)
        });
    }

    debug!(task = %task.id(), slices = leader.slices(), dispatched = dispatched.len(), "fanning out slices");
    join_all(dispatched)
        .await
        .into_iter()
        .collect::<Result<Vec<()>, TaskError>>()?;

    Ok(leader.response(task.reason_cancelled().map(str::to_string)))
}
