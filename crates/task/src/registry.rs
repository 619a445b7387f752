//! Node-local table of running bulk tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use reflow_core::{NodeId, TaskId};

use crate::error::TaskError;
use crate::info::TaskInfo;
use crate::task::{BulkTask, TaskSpec};

/// Allocates task ids for one node and tracks the tasks it runs.
///
/// A task registered with a local parent gets a child of the parent's
/// cancellation token, so cancelling a leader also stops its slices.
#[derive(Debug)]
pub struct TaskRegistry {
    node: NodeId,
    next_id: AtomicU64,
    tasks: DashMap<u64, Arc<BulkTask>>,
}

impl TaskRegistry {
    /// Create an empty registry for `node`.
    pub fn new(node: impl Into<NodeId>) -> Self {
        Self {
            node: node.into(),
            next_id: AtomicU64::new(1),
            tasks: DashMap::new(),
        }
    }

    /// The node this registry allocates ids for.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Register a new task.
    pub fn register(&self, spec: TaskSpec) -> Arc<BulkTask> {
        let id = TaskId::new(self.node.clone(), self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = spec
            .parent
            .as_ref()
            .and_then(|parent| self.get(parent))
            .map(|parent| parent.cancellation_token().child_token())
            .unwrap_or_default();
        let task = Arc::new(BulkTask::with_token(id.clone(), spec, token));
        self.tasks.insert(id.id(), Arc::clone(&task));
        tracing::debug!(task = %id, action = task.action(), parent = ?task.parent(), "task registered");
        task
    }

    /// Remove a finished task.
    pub fn unregister(&self, id: &TaskId) -> Option<Arc<BulkTask>> {
        if id.node() != &self.node {
            return None;
        }
        let removed = self.tasks.remove(&id.id()).map(|(_, task)| task);
        if removed.is_some() {
            tracing::debug!(task = %id, "task unregistered");
        }
        removed
    }

    /// Look up a task.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Arc<BulkTask>> {
        if id.node() != &self.node {
            return None;
        }
        self.tasks.get(&id.id()).map(|entry| Arc::clone(entry.value()))
    }

    /// Cancel a task and its local children.
    pub fn cancel(&self, id: &TaskId, reason: &str) -> Result<(), TaskError> {
        let task = self
            .get(id)
            .ok_or_else(|| TaskError::TaskNotFound(id.clone()))?;
        for child in self.children(id) {
            child.cancel(format!("parent task was cancelled [{reason}]"));
        }
        task.cancel(reason);
        Ok(())
    }

    /// Local tasks whose parent is `parent`, ordered by id.
    #[must_use]
    pub fn children(&self, parent: &TaskId) -> Vec<Arc<BulkTask>> {
        let mut children: Vec<_> = self
            .tasks
            .iter()
            .filter(|entry| entry.value().parent() == Some(parent))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        children.sort_by_key(|task| task.id().id());
        children
    }

    /// Monitoring view of every task, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<TaskInfo> {
        let mut infos: Vec<_> = self.tasks.iter().map(|entry| entry.value().info()).collect();
        infos.sort_by_key(|info| info.task_id.id());
        infos
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_are_sequential_per_node() {
        let registry = TaskRegistry::new("n1");
        let a = registry.register(TaskSpec::new("reindex"));
        let b = registry.register(TaskSpec::new("reindex"));
        assert_eq!(a.id(), &TaskId::new("n1", 1));
        assert_eq!(b.id(), &TaskId::new("n1", 2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookup_ignores_other_nodes() {
        let registry = TaskRegistry::new("n1");
        registry.register(TaskSpec::new("reindex"));
        assert!(registry.get(&TaskId::new("n1", 1)).is_some());
        assert!(registry.get(&TaskId::new("n2", 1)).is_none());
    }

    #[test]
    fn cancelling_parent_cancels_children() {
        let registry = TaskRegistry::new("n1");
        let parent = registry.register(TaskSpec::new("reindex"));
        let child = registry.register(TaskSpec::new("reindex").with_parent(parent.id().clone()));
        let other = registry.register(TaskSpec::new("reindex"));

        registry.cancel(parent.id(), "by user").unwrap();

        assert_eq!(parent.reason_cancelled(), Some("by user"));
        assert!(child.is_cancelled());
        assert_eq!(
            child.reason_cancelled(),
            Some("parent task was cancelled [by user]")
        );
        assert!(!other.is_cancelled());
    }

    #[test]
    fn child_token_follows_parent_token() {
        let registry = TaskRegistry::new("n1");
        let parent = registry.register(TaskSpec::new("reindex"));
        let child = registry.register(TaskSpec::new("reindex").with_parent(parent.id().clone()));
        parent.cancel("direct");
        assert!(child.cancellation_token().is_cancelled());
    }

    #[test]
    fn cancel_unknown_task_fails() {
        let registry = TaskRegistry::new("n1");
        let id = TaskId::new("n1", 9);
        assert_eq!(registry.cancel(&id, "x").unwrap_err(), TaskError::TaskNotFound(id));
    }

    #[test]
    fn unregister_removes() {
        let registry = TaskRegistry::new("n1");
        let task = registry.register(TaskSpec::new("reindex"));
        assert!(registry.unregister(task.id()).is_some());
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }
}
