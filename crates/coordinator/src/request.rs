//! Bulk operation requests.
//!
//! A [`BulkRequest`] describes one operation: what to read, where from,
//! how to split it and how fast to go. The same type is used for the
//! top-level request, for the per-slice sub-requests a leader sends out and
//! for the request a relocating task sends to its successor
//! ([`ResumeRequest`]).

use std::collections::BTreeMap;
use std::fmt;

use reflow_core::TaskId;
use reflow_task::{RequestsPerSecond, ResumeInfo};
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CoordinatorError;

/// Field slices are partitioned on unless the request names another one.
pub const DEFAULT_SLICE_FIELD: &str = "_id";

/// Kind of bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Copy documents into another index.
    Reindex,
    /// Rewrite documents in place.
    UpdateByQuery,
    /// Delete matching documents.
    DeleteByQuery,
}

impl OperationKind {
    /// Action name used for task registration, logs and metrics.
    #[must_use]
    pub fn action(self) -> &'static str {
        match self {
            Self::Reindex => "reindex",
            Self::UpdateByQuery => "update_by_query",
            Self::DeleteByQuery => "delete_by_query",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// How many slices to split an operation into.
///
/// Renders as `"auto"` or as the slice count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slices {
    /// One slice per primary shard of the smallest source index, capped.
    Auto,
    /// A fixed number of slices.
    Fixed(u32),
}

impl Default for Slices {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

impl fmt::Display for Slices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for Slices {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Fixed(n) => serializer.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Slices {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u32),
            Word(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => Ok(Self::Fixed(n)),
            Repr::Word(word) if word == "auto" => Ok(Self::Auto),
            Repr::Word(word) => word.parse().map(Self::Fixed).map_err(|_| {
                serde::de::Error::custom(format!("slices must be a number or [auto] but was [{word}]"))
            }),
        }
    }
}

/// Which partition of the source documents a sub-request reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSpec {
    /// Slice id, `0..max`.
    pub id: u32,
    /// Total number of slices.
    pub max: u32,
    /// Document field the partition is computed from.
    #[serde(default = "default_slice_field")]
    pub field: String,
}

fn default_slice_field() -> String {
    DEFAULT_SLICE_FIELD.to_string()
}

impl SliceSpec {
    /// Slice `id` of `max`, partitioned on the document id.
    pub fn new(id: u32, max: u32) -> Self {
        Self {
            id,
            max,
            field: default_slice_field(),
        }
    }

    /// Returns `true` if the document with partition key `key` belongs to
    /// this slice.
    ///
    /// Remote reads send the slice to the remote cluster, which partitions
    /// on its side. A host-implemented [`SourceFactory`](crate::ports::SourceFactory) for local reads
    /// filters with this instead, so every slice sees a disjoint share.
    ///
    /// The key is hashed with SHA-256 and the first eight bytes, read big
    /// endian, are taken modulo `max`. The result only depends on the key,
    /// so slicing the same operation again yields the same partitions.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.max <= 1 || partition_of(key, self.max) == self.id
    }
}

/// Slice that `key` falls into when split `max` ways. The partition
/// function behind [`SliceSpec::contains`], for hosts that route documents
/// to slices themselves.
#[must_use]
pub fn partition_of(key: &str, max: u32) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(max.max(1))) as u32
}

/// A remote cluster to read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    /// Scheme, host and port, e.g. `http://remote:9200`.
    pub host: String,
    /// Headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Version of the remote, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl RemoteInfo {
    /// A remote at `host` whose version is not yet known.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            headers: BTreeMap::new(),
            version: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// One bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRequest {
    /// What the operation does.
    pub kind: OperationKind,
    /// Source indices.
    pub indices: Vec<String>,
    /// Query selecting the documents. Everything when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Destination index, for reindex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Remote source, if the documents live in another cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteInfo>,
    /// Documents per batch.
    pub batch_size: u32,
    /// How many slices to split into.
    #[serde(default)]
    pub slices: Slices,
    /// The slice this request reads, for slice sub-requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<SliceSpec>,
    /// Throttle for the whole operation.
    #[serde(default)]
    pub requests_per_second: RequestsPerSecond,
    /// Task the request belongs to, for slice sub-requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task: Option<TaskId>,
    /// Where an interrupted run of this request stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_info: Option<ResumeInfo>,
}

impl BulkRequest {
    /// A request reading all of `indices` in batches of 1000.
    pub fn new(kind: OperationKind, indices: Vec<String>) -> Self {
        Self {
            kind,
            indices,
            query: None,
            destination: None,
            remote: None,
            batch_size: 1000,
            slices: Slices::default(),
            slice: None,
            requests_per_second: RequestsPerSecond::UNLIMITED,
            parent_task: None,
            resume_info: None,
        }
    }

    /// A reindex from `indices` into `destination`.
    pub fn reindex(indices: Vec<String>, destination: impl Into<String>) -> Self {
        let mut request = Self::new(OperationKind::Reindex, indices);
        request.destination = Some(destination.into());
        request
    }

    /// Set the query.
    #[must_use]
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Read from a remote cluster.
    #[must_use]
    pub fn with_remote(mut self, remote: RemoteInfo) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the slicing.
    #[must_use]
    pub fn with_slices(mut self, slices: Slices) -> Self {
        self.slices = slices;
        self
    }

    /// Set the throttle.
    #[must_use]
    pub fn with_requests_per_second(mut self, requests_per_second: RequestsPerSecond) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    /// Attach resume data.
    #[must_use]
    pub fn with_resume_info(mut self, resume_info: ResumeInfo) -> Self {
        self.resume_info = Some(resume_info);
        self
    }

    /// Returns `true` if the request continues an interrupted run.
    #[must_use]
    pub fn is_resume(&self) -> bool {
        self.resume_info.is_some()
    }

    /// Description used for task registration.
    #[must_use]
    pub fn description(&self) -> String {
        let source = self.indices.join(",");
        let source = match &self.remote {
            Some(remote) => format!("{}/{source}", remote.host),
            None => source,
        };
        let description = match &self.destination {
            Some(destination) => format!("{} [{source}] to [{destination}]", self.kind),
            None => format!("{} [{source}]", self.kind),
        };
        match &self.slice {
            Some(slice) => format!("{description} slice [{}/{}]", slice.id, slice.max),
            None => description,
        }
    }

    /// Check the request before any work starts.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.batch_size == 0 {
            return Err(CoordinatorError::InvalidRequest(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.kind == OperationKind::Reindex && self.destination.is_none() {
            return Err(CoordinatorError::InvalidRequest(
                "reindex requires a destination index".to_string(),
            ));
        }
        if self.slices == Slices::Fixed(0) {
            return Err(CoordinatorError::InvalidRequest(
                "slices must be greater than 0 or [auto]".to_string(),
            ));
        }
        if let Some(slice) = &self.slice {
            if self.slices != Slices::Fixed(1) {
                return Err(CoordinatorError::InvalidRequest(format!(
                    "a slice sub-request cannot be sliced again, got slices [{}]",
                    self.slices
                )));
            }
            if slice.max == 0 || slice.id >= slice.max {
                return Err(CoordinatorError::InvalidRequest(format!(
                    "slice id [{}] must be less than max [{}]",
                    slice.id, slice.max
                )));
            }
        }
        if let Some(resume) = &self.resume_info {
            let Slices::Fixed(slices) = self.slices else {
                return Err(CoordinatorError::InvalidRequest(
                    "a resumed request cannot use automatic slicing".to_string(),
                ));
            };
            resume.validate(slices)?;
        }
        Ok(())
    }
}

/// A request to continue an interrupted operation on another node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRequest {
    /// The task that stopped.
    pub original: TaskId,
    /// The original request with its resume data attached.
    pub request: BulkRequest,
}

impl ResumeRequest {
    /// Package `resume_info` for `request`. The request's slicing is pinned
    /// to the count the resume data was recorded with.
    pub fn new(original: TaskId, request: BulkRequest, resume_info: ResumeInfo) -> Self {
        let mut request = request.with_slices(Slices::Fixed(resume_info.total_slices));
        request.resume_info = Some(resume_info);
        Self { original, request }
    }
}
