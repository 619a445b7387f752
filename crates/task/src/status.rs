//! Progress status of a bulk task and the slice merge rule.
//!
//! A [`Status`] is either the live progress of a single worker, or the
//! merged view a leader derives from its slices. Merged statuses are never
//! stored: [`Status::merge`] recomputes them from the slot list each time.
//!
//! Counters are unsigned, so a constructed `Status` can never hold a
//! negative value. Signed input (the wire form, or callers computing deltas)
//! goes through [`StatusBuilder`], which rejects negatives and names the
//! offending field.

use std::fmt;
use std::ops::Add;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TaskError;
use crate::outcome::SliceOutcome;

/// Wire value that stands for an unthrottled rate.
pub const UNLIMITED_WIRE_VALUE: f32 = -1.0;

/// Throttle setting of a task.
///
/// Unlimited is stored as `f32::INFINITY` so summing slice rates keeps
/// working; it renders as [`UNLIMITED_WIRE_VALUE`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestsPerSecond(f32);

impl RequestsPerSecond {
    /// No throttling.
    pub const UNLIMITED: Self = Self(f32::INFINITY);

    /// Validate a user supplied rate. `-1` and infinity mean unlimited.
    pub fn new(value: f32) -> Result<Self, TaskError> {
        if value == UNLIMITED_WIRE_VALUE || value == f32::INFINITY {
            return Ok(Self::UNLIMITED);
        }
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(TaskError::InvalidRequestsPerSecond(value.to_string()))
        }
    }

    /// Decode the wire form. Unlike [`RequestsPerSecond::new`] this accepts
    /// zero, which is what an aggregate of no slices reports.
    fn from_wire(value: f32) -> Result<Self, TaskError> {
        if value == UNLIMITED_WIRE_VALUE {
            Ok(Self::UNLIMITED)
        } else if value.is_finite() && value >= 0.0 {
            Ok(Self(value))
        } else {
            Err(TaskError::InvalidRequestsPerSecond(value.to_string()))
        }
    }

    const fn zero() -> Self {
        Self(0.0)
    }

    /// Returns `true` if no throttling applies.
    #[must_use]
    pub fn is_unlimited(self) -> bool {
        self.0.is_infinite()
    }

    /// The raw rate (`f32::INFINITY` when unlimited).
    #[must_use]
    pub fn get(self) -> f32 {
        self.0
    }

    /// The value as rendered externally.
    #[must_use]
    pub fn to_wire(self) -> f32 {
        if self.is_unlimited() {
            UNLIMITED_WIRE_VALUE
        } else {
            self.0
        }
    }

    /// The share of this rate each of `slices` sub-tasks gets.
    #[must_use]
    pub fn per_slice(self, slices: u32) -> Self {
        if self.is_unlimited() || slices == 0 {
            self
        } else {
            Self(self.0 / slices as f32)
        }
    }
}

impl Default for RequestsPerSecond {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

impl Add for RequestsPerSecond {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Display for RequestsPerSecond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            f.write_str("unlimited")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Serialize for RequestsPerSecond {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f32(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for RequestsPerSecond {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f32::deserialize(deserializer)?;
        Self::from_wire(value).map_err(serde::de::Error::custom)
    }
}

/// Progress snapshot of one slice, or the merge of several.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "StatusRepr", into = "StatusRepr")]
pub struct Status {
    /// Slice this status belongs to, if the task is a slice.
    pub slice_id: Option<u32>,
    /// Documents the task expects to process.
    pub total: u64,
    /// Documents updated in place.
    pub updated: u64,
    /// Documents created.
    pub created: u64,
    /// Documents deleted.
    pub deleted: u64,
    /// Scroll batches processed.
    pub batches: u64,
    /// Version conflicts encountered.
    pub version_conflicts: u64,
    /// Documents skipped as no-ops.
    pub noops: u64,
    /// Bulk requests retried after a rejection.
    pub bulk_retries: u64,
    /// Search requests retried after a rejection.
    pub search_retries: u64,
    /// Time spent waiting on the throttle.
    pub throttled: Duration,
    /// Current throttle setting.
    pub requests_per_second: RequestsPerSecond,
    /// Why the task was cancelled, if it was.
    pub reason_cancelled: Option<String>,
    /// Remaining time until the next throttled batch may start.
    pub throttled_until: Duration,
    /// Per-slice breakdown. Only populated on a merged status.
    pub slices: Vec<SliceOutcome>,
}

impl Status {
    /// Start building a status from signed values.
    pub fn builder() -> StatusBuilder {
        StatusBuilder::default()
    }

    /// Merge slice outcomes into a leader status.
    ///
    /// Counters, throttled time and requests-per-second are summed over
    /// `Completed` slots, saturating at their maximum. `throttled_until` is the minimum over the same
    /// slots (zero if there are none). `Pending` and `Failed` slots add
    /// nothing but stay in [`Status::slices`] at their position.
    pub fn merge(slices: Vec<SliceOutcome>, reason_cancelled: Option<String>) -> Self {
        let mut merged = Self {
            requests_per_second: RequestsPerSecond::zero(),
            reason_cancelled,
            ..Self::default()
        };
        let mut throttled_until: Option<Duration> = None;

        for status in slices.iter().filter_map(SliceOutcome::status) {
            merged.total = merged.total.saturating_add(status.total);
            merged.updated = merged.updated.saturating_add(status.updated);
            merged.created = merged.created.saturating_add(status.created);
            merged.deleted = merged.deleted.saturating_add(status.deleted);
            merged.batches = merged.batches.saturating_add(status.batches);
            merged.version_conflicts = merged.version_conflicts.saturating_add(status.version_conflicts);
            merged.noops = merged.noops.saturating_add(status.noops);
            merged.bulk_retries = merged.bulk_retries.saturating_add(status.bulk_retries);
            merged.search_retries = merged.search_retries.saturating_add(status.search_retries);
            merged.throttled = merged.throttled.saturating_add(status.throttled);
            merged.requests_per_second = merged.requests_per_second + status.requests_per_second;
            throttled_until = Some(match throttled_until {
                Some(current) => current.min(status.throttled_until),
                None => status.throttled_until,
            });
        }

        merged.throttled_until = throttled_until.unwrap_or(Duration::ZERO);
        merged.slices = slices;
        merged
    }

    /// Documents that reached a final per-document outcome.
    #[must_use]
    pub fn processed(&self) -> u64 {
        [self.created, self.deleted, self.version_conflicts, self.noops]
            .into_iter()
            .fold(self.updated, u64::saturating_add)
    }

    /// Returns `true` if the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason_cancelled.is_some()
    }
}

/// Builder that validates signed input before producing a [`Status`].
#[derive(Debug, Clone, Default)]
pub struct StatusBuilder {
    slice_id: Option<u32>,
    total: i64,
    updated: i64,
    created: i64,
    deleted: i64,
    batches: i64,
    version_conflicts: i64,
    noops: i64,
    bulk_retries: i64,
    search_retries: i64,
    throttled: Duration,
    requests_per_second: RequestsPerSecond,
    reason_cancelled: Option<String>,
    throttled_until: Duration,
    slices: Vec<SliceOutcome>,
}

macro_rules! counter_setters {
    ($($field:ident),* $(,)?) => {
        $(
            #[doc = concat!("Set the `", stringify!($field), "` counter.")]
            pub fn $field(mut self, value: i64) -> Self {
                self.$field = value;
                self
            }
        )*
    };
}

impl StatusBuilder {
    counter_setters!(
        total,
        updated,
        created,
        deleted,
        batches,
        version_conflicts,
        noops,
        bulk_retries,
        search_retries,
    );

    /// Set the slice id.
    pub fn slice_id(mut self, slice_id: Option<u32>) -> Self {
        self.slice_id = slice_id;
        self
    }

    /// Set the time spent throttled.
    pub fn throttled(mut self, throttled: Duration) -> Self {
        self.throttled = throttled;
        self
    }

    /// Set the throttle setting.
    pub fn requests_per_second(mut self, rps: RequestsPerSecond) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Set the cancellation reason.
    pub fn reason_cancelled(mut self, reason: Option<String>) -> Self {
        self.reason_cancelled = reason;
        self
    }

    /// Set the time until the next throttled batch.
    pub fn throttled_until(mut self, throttled_until: Duration) -> Self {
        self.throttled_until = throttled_until;
        self
    }

    /// Set the per-slice breakdown.
    pub fn slices(mut self, slices: Vec<SliceOutcome>) -> Self {
        self.slices = slices;
        self
    }

    /// Validate and build. Fails on the first negative counter.
    pub fn build(self) -> Result<Status, TaskError> {
        Ok(Status {
            slice_id: self.slice_id,
            total: non_negative("total", self.total)?,
            updated: non_negative("updated", self.updated)?,
            created: non_negative("created", self.created)?,
            deleted: non_negative("deleted", self.deleted)?,
            batches: non_negative("batches", self.batches)?,
            version_conflicts: non_negative("version_conflicts", self.version_conflicts)?,
            noops: non_negative("noops", self.noops)?,
            bulk_retries: non_negative("bulk_retries", self.bulk_retries)?,
            search_retries: non_negative("search_retries", self.search_retries)?,
            throttled: self.throttled,
            requests_per_second: self.requests_per_second,
            reason_cancelled: self.reason_cancelled,
            throttled_until: self.throttled_until,
            slices: self.slices,
        })
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, TaskError> {
    u64::try_from(value).map_err(|_| TaskError::Validation { field, value })
}

fn millis(field: &'static str, value: i64) -> Result<Duration, TaskError> {
    non_negative(field, value).map(Duration::from_millis)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RetriesRepr {
    #[serde(default)]
    bulk: i64,
    #[serde(default)]
    search: i64,
}

/// External form of [`Status`].
#[derive(Debug, Serialize, Deserialize)]
struct StatusRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slice_id: Option<u32>,
    #[serde(default)]
    total: i64,
    #[serde(default)]
    updated: i64,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    deleted: i64,
    #[serde(default)]
    batches: i64,
    #[serde(default)]
    version_conflicts: i64,
    #[serde(default)]
    noops: i64,
    #[serde(default)]
    retries: RetriesRepr,
    #[serde(default)]
    throttled_millis: i64,
    #[serde(default)]
    requests_per_second: RequestsPerSecond,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason_cancelled: Option<String>,
    #[serde(default)]
    throttled_until_millis: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    slices: Vec<SliceOutcome>,
}

impl TryFrom<StatusRepr> for Status {
    type Error = TaskError;

    fn try_from(repr: StatusRepr) -> Result<Self, Self::Error> {
        Status::builder()
            .slice_id(repr.slice_id)
            .total(repr.total)
            .updated(repr.updated)
            .created(repr.created)
            .deleted(repr.deleted)
            .batches(repr.batches)
            .version_conflicts(repr.version_conflicts)
            .noops(repr.noops)
            .bulk_retries(repr.retries.bulk)
            .search_retries(repr.retries.search)
            .throttled(millis("throttled_millis", repr.throttled_millis)?)
            .requests_per_second(repr.requests_per_second)
            .reason_cancelled(repr.reason_cancelled)
            .throttled_until(millis(
                "throttled_until_millis",
                repr.throttled_until_millis,
            )?)
            .slices(repr.slices)
            .build()
    }
}

impl From<Status> for StatusRepr {
    fn from(status: Status) -> Self {
        Self {
            slice_id: status.slice_id,
            total: status.total as i64,
            updated: status.updated as i64,
            created: status.created as i64,
            deleted: status.deleted as i64,
            batches: status.batches as i64,
            version_conflicts: status.version_conflicts as i64,
            noops: status.noops as i64,
            retries: RetriesRepr {
                bulk: status.bulk_retries as i64,
                search: status.search_retries as i64,
            },
            throttled_millis: status.throttled.as_millis() as i64,
            requests_per_second: status.requests_per_second,
            reason_cancelled: status.reason_cancelled,
            throttled_until_millis: status.throttled_until.as_millis() as i64,
            slices: status.slices,
        }
    }
}
