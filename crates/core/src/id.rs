//! Node and task identifiers.
//!
//! A [`TaskId`] is only unique together with the node that allocated it, so
//! it always carries its [`NodeId`]. Both render as plain strings
//! (`node-1`, `node-1:42`) so they can be logged and passed around by
//! clients that track a task across a relocation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing identifiers from strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The string had no `node:number` separator.
    #[error("malformed task id [{0}], expected <node>:<number>")]
    Malformed(String),

    /// The task number was not an unsigned integer.
    #[error("invalid task number in [{0}]")]
    InvalidNumber(String),

    /// The node part was empty.
    #[error("task id [{0}] has an empty node id")]
    EmptyNode(String),
}

/// Identifier of a node in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a task: the node that owns it plus a node-local number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId {
    node: NodeId,
    id: u64,
}

impl TaskId {
    /// Create a task identifier.
    pub fn new(node: impl Into<NodeId>, id: u64) -> Self {
        Self {
            node: node.into(),
            id,
        }
    }

    /// The node that owns the task.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// The node-local task number.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.id)
    }
}

impl FromStr for TaskId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, id) = s
            .rsplit_once(':')
            .ok_or_else(|| IdParseError::Malformed(s.to_string()))?;
        if node.is_empty() {
            return Err(IdParseError::EmptyNode(s.to_string()));
        }
        let id = id
            .parse::<u64>()
            .map_err(|_| IdParseError::InvalidNumber(s.to_string()))?;
        Ok(Self::new(node, id))
    }
}
