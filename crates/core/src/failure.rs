//! Partial failures carried inside otherwise successful responses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A shard- or node-level failure reported by a search page.
///
/// These are embedded in a successful transport response and are distinct
/// from a transport failure: the page still carries hits and a scroll token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFailure {
    /// Index the failing shard belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Shard number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<u32>,
    /// Node the failure happened on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Human readable reason.
    pub reason: String,
    /// HTTP status associated with the failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl SearchFailure {
    /// Create a failure with only a reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            index: None,
            shard: None,
            node: None,
            reason: reason.into(),
            status: None,
        }
    }

    /// Set the index and shard.
    #[must_use]
    pub fn on_shard(mut self, index: impl Into<String>, shard: u32) -> Self {
        self.index = Some(index.into());
        self.shard = Some(shard);
        self
    }

    /// Set the node.
    #[must_use]
    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Set the status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search failure")?;
        if let Some(index) = &self.index {
            write!(f, " [{index}]")?;
        }
        if let Some(shard) = self.shard {
            write!(f, "[{shard}]")?;
        }
        if let Some(node) = &self.node {
            write!(f, " on [{node}]")?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// A single document that the bulk writer failed to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// Destination index.
    pub index: String,
    /// Document id.
    pub id: String,
    /// Failure cause.
    pub cause: String,
    /// HTTP status of the item.
    pub status: u16,
}

impl fmt::Display for BulkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bulk failure [{}][{}] ({}): {}",
            self.index, self.id, self.status, self.cause
        )
    }
}
