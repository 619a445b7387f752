//! Property tests for status validation and the slice merge rule

use std::time::Duration;

use proptest::prelude::*;
use reflow_task::{RequestsPerSecond, SliceFailure, SliceOutcome, Status, StatusBuilder, TaskError};

const COUNTERS: [&str; 9] = [
    "total",
    "updated",
    "created",
    "deleted",
    "batches",
    "version_conflicts",
    "noops",
    "bulk_retries",
    "search_retries",
];

fn set(builder: StatusBuilder, field: &str, value: i64) -> StatusBuilder {
    match field {
        "total" => builder.total(value),
        "updated" => builder.updated(value),
        "created" => builder.created(value),
        "deleted" => builder.deleted(value),
        "batches" => builder.batches(value),
        "version_conflicts" => builder.version_conflicts(value),
        "noops" => builder.noops(value),
        "bulk_retries" => builder.bulk_retries(value),
        "search_retries" => builder.search_retries(value),
        other => unreachable!("unknown counter {other}"),
    }
}

/// Generate a completed slice with bounded counters
fn arb_completed() -> impl Strategy<Value = SliceOutcome> {
    (
        0u64..1_000_000,
        0u64..1_000,
        0u64..10_000,
        0u64..10_000,
        prop_oneof![Just(None), (1u32..1000).prop_map(Some)],
    )
        .prop_map(|(total, batches, throttled_ms, until_ms, rps)| {
            SliceOutcome::Completed(Status {
                total,
                created: total / 2,
                batches,
                throttled: Duration::from_millis(throttled_ms),
                throttled_until: Duration::from_millis(until_ms),
                requests_per_second: rps.map_or(RequestsPerSecond::UNLIMITED, |r| {
                    RequestsPerSecond::new(r as f32).unwrap()
                }),
                ..Status::default()
            })
        })
}

/// Generate any slot
fn arb_outcome() -> impl Strategy<Value = SliceOutcome> {
    prop_oneof![
        3 => arb_completed(),
        1 => Just(SliceOutcome::Pending),
        1 => "[a-z ]{1,16}".prop_map(|reason| SliceOutcome::Failed(SliceFailure::new(reason))),
    ]
}

proptest! {
    /// Any negative counter fails construction and the error names that counter.
    #[test]
    fn negative_counter_is_named(
        index in 0usize..COUNTERS.len(),
        value in i64::MIN..0,
        others in proptest::collection::vec(0i64..1000, COUNTERS.len()),
    ) {
        let field = COUNTERS[index];
        let mut builder = Status::builder();
        for (name, other) in COUNTERS.iter().zip(&others) {
            builder = set(builder, name, *other);
        }
        builder = set(builder, field, value);

        let err = builder.build().unwrap_err();
        prop_assert_eq!(&err, &TaskError::Validation { field, value });
        prop_assert!(err.to_string().starts_with(field));
    }

    /// Non-negative counters always build.
    #[test]
    fn non_negative_counters_build(values in proptest::collection::vec(0i64..i64::MAX, COUNTERS.len())) {
        let mut builder = Status::builder();
        for (name, value) in COUNTERS.iter().zip(&values) {
            builder = set(builder, name, *value);
        }
        let status = builder.build().unwrap();
        prop_assert_eq!(status.total, values[0] as u64);
        prop_assert_eq!(status.search_retries, values[8] as u64);
    }

    /// Merged counters are the sums over completed slots only.
    #[test]
    fn merge_sums_completed(outcomes in proptest::collection::vec(arb_outcome(), 0..24)) {
        let completed: Vec<&Status> = outcomes.iter().filter_map(SliceOutcome::status).collect();
        let merged = Status::merge(outcomes.clone(), None);

        prop_assert_eq!(merged.total, completed.iter().map(|s| s.total).sum::<u64>());
        prop_assert_eq!(merged.created, completed.iter().map(|s| s.created).sum::<u64>());
        prop_assert_eq!(merged.batches, completed.iter().map(|s| s.batches).sum::<u64>());
        prop_assert_eq!(
            merged.throttled,
            completed.iter().map(|s| s.throttled).sum::<Duration>()
        );
        prop_assert_eq!(merged.slices, outcomes);
    }

    /// Merged throttled_until is the minimum over completed slots.
    #[test]
    fn merge_takes_min_throttled_until(outcomes in proptest::collection::vec(arb_outcome(), 0..24)) {
        let expected = outcomes
            .iter()
            .filter_map(SliceOutcome::status)
            .map(|s| s.throttled_until)
            .min()
            .unwrap_or(Duration::ZERO);
        prop_assert_eq!(Status::merge(outcomes, None).throttled_until, expected);
    }

    /// The merged rate is unlimited exactly when some completed slot is unlimited.
    #[test]
    fn merge_rate_unlimited_if_any_slot_is(outcomes in proptest::collection::vec(arb_outcome(), 0..24)) {
        let any_unlimited = outcomes
            .iter()
            .filter_map(SliceOutcome::status)
            .any(|s| s.requests_per_second.is_unlimited());
        let merged = Status::merge(outcomes, None);
        prop_assert_eq!(merged.requests_per_second.is_unlimited(), any_unlimited);
    }

    /// Only completed slots matter: adding pending or failed slots never changes counters.
    #[test]
    fn pending_and_failed_contribute_nothing(
        outcomes in proptest::collection::vec(arb_completed(), 0..8),
        extra in 0usize..5,
    ) {
        let base = Status::merge(outcomes.clone(), None);
        let mut padded = outcomes;
        for i in 0..extra {
            padded.push(if i % 2 == 0 {
                SliceOutcome::Pending
            } else {
                SliceOutcome::Failed(SliceFailure::new("x"))
            });
        }
        let merged = Status::merge(padded, None);
        prop_assert_eq!(merged.total, base.total);
        prop_assert_eq!(merged.batches, base.batches);
        prop_assert_eq!(merged.throttled_until, base.throttled_until);
    }
}

#[test]
fn merge_of_nothing_is_zero() {
    let merged = Status::merge(Vec::new(), None);
    assert_eq!(merged.total, 0);
    assert_eq!(merged.processed(), 0);
    assert_eq!(merged.bulk_retries + merged.search_retries, 0);
    assert_eq!(merged.throttled_until, Duration::ZERO);
}
