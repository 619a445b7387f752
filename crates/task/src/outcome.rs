//! Per-slice outcome slots held by a leader.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::status::Status;

/// Why a slice failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceFailure {
    /// Human readable reason, including the cause chain.
    pub reason: String,
    /// HTTP-like status of the failure, if one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl SliceFailure {
    /// Create a failure from a reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            status: None,
        }
    }

    /// Attach a status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Capture an error and its `source()` chain.
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut reason = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(reason)
    }
}

impl fmt::Display for SliceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

impl StdError for SliceFailure {}

/// State of one slice slot.
///
/// `Completed` holds a status snapshot. The leader stores the final status
/// of a finished slice there; the combined monitoring view also uses it for
/// the latest reported status of a slice that is still running.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SliceOutcome {
    /// No status reported yet.
    #[default]
    Pending,
    /// The slice reported this status.
    Completed(Status),
    /// The slice failed as a whole.
    Failed(SliceFailure),
}

impl SliceOutcome {
    /// The status, if this slot holds one.
    #[must_use]
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Completed(status) => Some(status),
            Self::Pending | Self::Failed(_) => None,
        }
    }

    /// The failure, if this slot holds one.
    #[must_use]
    pub fn failure(&self) -> Option<&SliceFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Pending | Self::Completed(_) => None,
        }
    }

    /// Returns `true` if nothing has been reported for this slot.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Wire shape of a non-pending slot: a failure is wrapped in `{"error": ..}`
/// so it can never be confused with a status object.
#[derive(Deserialize)]
#[serde(untagged)]
enum OutcomeRepr {
    Failed { error: SliceFailure },
    Completed(Status),
}

impl Serialize for SliceOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Pending => serializer.serialize_none(),
            Self::Completed(status) => status.serialize(serializer),
            Self::Failed(failure) => {
                #[derive(Serialize)]
                struct Wrapped<'a> {
                    error: &'a SliceFailure,
                }
                Wrapped { error: failure }.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for SliceOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<OutcomeRepr>::deserialize(deserializer)? {
            None => Self::Pending,
            Some(OutcomeRepr::Completed(status)) => Self::Completed(status),
            Some(OutcomeRepr::Failed { error }) => Self::Failed(error),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn pending_renders_null() {
        assert_eq!(serde_json::to_value(SliceOutcome::Pending).unwrap(), json!(null));
    }

    #[test]
    fn failed_is_tagged_with_error() {
        let outcome = SliceOutcome::Failed(SliceFailure::new("shard lost").with_status(503));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"error": {"reason": "shard lost", "status": 503}})
        );
    }

    #[test]
    fn completed_renders_status_object() {
        let outcome = SliceOutcome::Completed(Status {
            slice_id: Some(1),
            total: 4,
            ..Status::default()
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["slice_id"], json!(1));
        assert_eq!(value["total"], json!(4));
    }

    #[test]
    fn list_roundtrip_keeps_each_kind() {
        let outcomes = vec![
            SliceOutcome::Completed(Status::default()),
            SliceOutcome::Pending,
            SliceOutcome::Failed(SliceFailure::new("x")),
        ];
        let json = serde_json::to_string(&outcomes).unwrap();
        let back: Vec<SliceOutcome> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcomes);
    }

    #[test]
    fn from_error_includes_cause_chain() {
        #[derive(Debug)]
        struct Inner;
        impl fmt::Display for Inner {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("connection reset")
            }
        }
        impl StdError for Inner {}

        #[derive(Debug)]
        struct Outer(Inner);
        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("scroll failed")
            }
        }
        impl StdError for Outer {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let failure = SliceFailure::from_error(&Outer(Inner));
        assert_eq!(failure.reason, "scroll failed: connection reset");
    }
}
