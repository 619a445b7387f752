//! Cluster membership view.
//!
//! Coordinators never hold a live reference to membership state. They take
//! an immutable [`ClusterSnapshot`] and make every decision for one step
//! against that snapshot, so a decision is always consistent with a single
//! view of the cluster even while membership keeps changing underneath.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// A member of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryNode {
    /// Node identifier.
    pub id: NodeId,
    /// Human readable node name.
    pub name: String,
    /// Transport address, if known.
    #[serde(default)]
    pub address: Option<String>,
}

impl DiscoveryNode {
    /// Create a node whose name equals its id.
    pub fn new(id: impl Into<NodeId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            address: None,
        }
    }

    /// Set the transport address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Immutable view of cluster membership and shutdown intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Monotonic version of this view.
    pub version: u64,
    /// The node this process runs on.
    pub local_node: NodeId,
    /// Current members keyed by id.
    pub nodes: BTreeMap<NodeId, DiscoveryNode>,
    /// Nodes that have been marked for shutdown.
    #[serde(default)]
    pub shutting_down: BTreeSet<NodeId>,
}

impl ClusterSnapshot {
    /// A single-node cluster containing only the local node.
    pub fn single(local: impl Into<NodeId>) -> Self {
        let local = local.into();
        let mut nodes = BTreeMap::new();
        nodes.insert(local.clone(), DiscoveryNode::new(local.clone()));
        Self {
            version: 0,
            local_node: local,
            nodes,
            shutting_down: BTreeSet::new(),
        }
    }

    /// Add a member.
    #[must_use]
    pub fn with_node(mut self, node: DiscoveryNode) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    /// Mark a member as shutting down.
    #[must_use]
    pub fn with_shutting_down(mut self, node: impl Into<NodeId>) -> Self {
        self.shutting_down.insert(node.into());
        self
    }

    /// Remove a member (and any shutdown marker it had).
    #[must_use]
    pub fn without_node(mut self, node: &NodeId) -> Self {
        self.nodes.remove(node);
        self.shutting_down.remove(node);
        self
    }

    /// Look up a member.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&DiscoveryNode> {
        self.nodes.get(id)
    }

    /// Returns `true` if the node is a current member.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns `true` if the node has been marked for shutdown.
    #[must_use]
    pub fn is_shutting_down(&self, id: &NodeId) -> bool {
        self.shutting_down.contains(id)
    }

    /// Returns `true` if the local node has been marked for shutdown.
    #[must_use]
    pub fn local_shutting_down(&self) -> bool {
        self.is_shutting_down(&self.local_node)
    }

    /// Members other than the local node that are not shutting down.
    pub fn healthy_remote_nodes(&self) -> impl Iterator<Item = &DiscoveryNode> {
        self.nodes
            .values()
            .filter(|n| n.id != self.local_node && !self.shutting_down.contains(&n.id))
    }
}

/// Source of cluster membership snapshots.
pub trait ClusterView: Send + Sync + fmt::Debug {
    /// The current membership snapshot.
    fn snapshot(&self) -> Arc<ClusterSnapshot>;

    /// The local node id.
    fn local_node(&self) -> NodeId {
        self.snapshot().local_node.clone()
    }
}

/// Lock-free [`ClusterView`] whose snapshot is swapped on every update.
pub struct SharedCluster {
    current: ArcSwap<ClusterSnapshot>,
}

impl SharedCluster {
    /// Create a view seeded with `initial`.
    pub fn new(initial: ClusterSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Apply `f` to the current snapshot and publish the result with a bumped
    /// version. `f` may run more than once under contention.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(ClusterSnapshot) -> ClusterSnapshot,
    {
        self.current.rcu(|current| {
            let mut next = f(ClusterSnapshot::clone(current));
            next.version = current.version + 1;
            next
        });
    }
}

impl fmt::Debug for SharedCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("SharedCluster")
            .field("version", &snapshot.version)
            .field("local_node", &snapshot.local_node)
            .field("nodes", &snapshot.nodes.len())
            .finish()
    }
}

impl ClusterView for SharedCluster {
    fn snapshot(&self) -> Arc<ClusterSnapshot> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn three_nodes() -> ClusterSnapshot {
        ClusterSnapshot::single("a")
            .with_node(DiscoveryNode::new("b"))
            .with_node(DiscoveryNode::new("c"))
    }

    #[test]
    fn healthy_remote_nodes_excludes_local_and_shutting_down() {
        let snapshot = three_nodes().with_shutting_down("b");
        let ids: Vec<_> = snapshot
            .healthy_remote_nodes()
            .map(|n| n.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["c".to_string()]);
    }

    #[test]
    fn local_shutdown_flag() {
        let snapshot = three_nodes();
        assert!(!snapshot.local_shutting_down());
        let snapshot = snapshot.with_shutting_down("a");
        assert!(snapshot.local_shutting_down());
    }

    #[test]
    fn without_node_drops_shutdown_marker() {
        let snapshot = three_nodes()
            .with_shutting_down("b")
            .without_node(&NodeId::new("b"));
        assert!(!snapshot.contains(&NodeId::new("b")));
        assert!(!snapshot.is_shutting_down(&NodeId::new("b")));
    }

    #[test]
    fn shared_cluster_update_bumps_version() {
        let cluster = SharedCluster::new(three_nodes());
        let before = cluster.snapshot();
        cluster.update(|s| s.with_shutting_down("a"));
        let after = cluster.snapshot();

        assert_eq!(before.version + 1, after.version);
        assert!(!before.local_shutting_down());
        assert!(after.local_shutting_down());
        assert_eq!(cluster.local_node(), NodeId::new("a"));
    }
}
