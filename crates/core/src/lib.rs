#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Reflow Core
//!
//! Shared building blocks for the reflow crates:
//!
//! - **Identifiers**: [`NodeId`] and [`TaskId`] (a node id plus a task number)
//! - **Cluster view**: [`ClusterSnapshot`], the [`ClusterView`] trait and the
//!   lock-free [`SharedCluster`] implementation
//! - **Failure records**: [`SearchFailure`] and [`BulkFailure`], the partial
//!   failures that travel inside otherwise successful responses

pub mod cluster;
pub mod failure;
pub mod id;

pub use cluster::{ClusterSnapshot, ClusterView, DiscoveryNode, SharedCluster};
pub use failure::{BulkFailure, SearchFailure};
pub use id::{IdParseError, NodeId, TaskId};
