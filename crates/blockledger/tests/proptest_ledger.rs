//! Property-based tests for blockledger using proptest.
//!
//! These cover block arithmetic, completion convergence, and the order
//! independence of both reductions under arbitrary batching and reordering.

use blockledger::{
    block_count, bucket_summary_map, bucket_summary_reduce, finalize, initial_blocks,
    merge_pair_lists, remove_block, size_map, size_reduce, still_waiting, Bucket, BucketKey,
    BucketTally, Declared, History, Manifest, ManifestState, MapArgs, Metric, Monoid,
    MultipartInfo, ObjectKey, ObjectValue, Part, SizeTally, Timestamp,
};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Generator for one flattened `((bucket, metric), value)` pair.
fn any_pair() -> impl Strategy<Value = (BucketKey, u64)> {
    (0usize..9, 0usize..3, 0u64..1_000_000)
        .prop_map(|(b, m, v)| ((Bucket::ALL[b], Metric::ALL[m]), v))
}

/// Generator for a set of map outputs.
fn any_pair_lists() -> impl Strategy<Value = Vec<Vec<(BucketKey, u64)>>> {
    proptest::collection::vec(proptest::collection::vec(any_pair(), 0..30), 0..20)
}

fn any_state() -> impl Strategy<Value = ManifestState> {
    prop_oneof![
        Just(ManifestState::Writing),
        Just(ManifestState::Active),
        Just(ManifestState::PendingDelete),
        Just(ManifestState::ScheduledDelete)
    ]
}

fn any_timestamp() -> impl Strategy<Value = Option<Timestamp>> {
    prop_oneof![
        Just(None),
        Just(Some(Timestamp::Malformed(serde_json::json!("not a time")))),
        (-100i64..100).prop_map(|days| Some(Timestamp::Instant(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::days(days)
        ))),
    ]
}

fn any_multipart() -> impl Strategy<Value = Option<Declared<MultipartInfo>>> {
    prop_oneof![
        Just(None),
        Just(Some(Declared::Invalid(serde_json::json!({"bogus": 1})))),
        proptest::collection::vec((0u64..10_000, 1u64..1_000), 0..5).prop_map(|parts| {
            Some(Declared::Valid(MultipartInfo::new(
                parts.into_iter().map(|(len, size)| Part::new(len, size)).collect(),
            )))
        }),
    ]
}

fn any_manifest() -> impl Strategy<Value = Manifest> {
    (
        any_state(),
        prop_oneof![
            (0u64..100_000).prop_map(Declared::Valid),
            Just(Declared::Invalid(serde_json::json!("??"))),
        ],
        1u64..4_096,
        any_multipart(),
        any_timestamp(),
        any_timestamp(),
    )
        .prop_map(|(state, content_length, size, multipart, started, marked)| Manifest {
            id: Uuid::new_v4(),
            key: ObjectKey::new("bucket", "obj"),
            content_length,
            block_size: Declared::Valid(size),
            state,
            blocks_remaining: BTreeSet::new(),
            multipart,
            write_start_time: started,
            delete_marked_time: marked,
            last_block_written_time: None,
        })
}

fn any_object_value() -> impl Strategy<Value = ObjectValue> {
    prop_oneof![
        1 => Just(ObjectValue::NotFound),
        4 => proptest::collection::vec(any_manifest(), 0..6).prop_map(|manifests| {
            ObjectValue::Found(History::from_manifests(ObjectKey::new("bucket", "obj"), manifests))
        }),
    ]
}

/// Splits `items` into consecutive groups at the given cut points.
fn partition<T: Clone>(items: &[T], cuts: &[usize]) -> Vec<Vec<T>> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (items.len() + 1)).collect();
    points.push(0);
    points.push(items.len());
    points.sort_unstable();
    points.dedup();
    points.windows(2).map(|w| items[w[0]..w[1]].to_vec()).collect()
}

proptest! {
    /// block_count is ceiling division.
    #[test]
    fn prop_block_count_is_ceiling(len in 0u64..10_000_000, size in 1u64..100_000) {
        let count = block_count(len, size);
        prop_assert!(count * size >= len);
        prop_assert!(count == 0 || (count - 1) * size < len);
        prop_assert_eq!(count, (len + size - 1) / size);
    }

    /// initial_blocks is exactly 0..block_count.
    #[test]
    fn prop_initial_blocks_contiguous(len in 0u64..200_000, size in 1u64..5_000) {
        let blocks = initial_blocks(len, size);
        prop_assert_eq!(blocks.len() as u64, block_count(len, size));
        prop_assert!(blocks.iter().copied().eq(0..block_count(len, size)));
    }

    /// Acknowledging every outstanding block, in any order and with repeats and
    /// strays, ends the wait.
    #[test]
    fn prop_removing_all_blocks_completes(
        (len, size, order) in (0u64..20_000, 1u64..500).prop_flat_map(|(len, size)| {
            let ids: Vec<u64> = (0..block_count(len, size)).collect();
            (Just(len), Just(size), Just(ids).prop_shuffle())
        }),
        strays in proptest::collection::vec(1_000_000u64..2_000_000, 0..5),
    ) {
        let mut m = Manifest {
            id: Uuid::new_v4(),
            key: ObjectKey::new("b", "n"),
            content_length: Declared::Valid(len),
            block_size: Declared::Valid(size),
            state: ManifestState::Writing,
            blocks_remaining: initial_blocks(len, size),
            multipart: None,
            write_start_time: None,
            delete_marked_time: None,
            last_block_written_time: None,
        };
        for seq in strays {
            let before = m.blocks_remaining.clone();
            m = remove_block(m, seq);
            prop_assert_eq!(&m.blocks_remaining, &before);
        }
        for seq in order.iter().chain(order.iter()) {
            m = remove_block(m, *seq);
        }
        prop_assert!(!still_waiting(&m));
    }

    /// finalize always yields an active manifest with nothing outstanding.
    #[test]
    fn prop_finalize_unconditional(remaining in proptest::collection::btree_set(0u64..1_000, 0..50)) {
        let m = Manifest {
            id: Uuid::new_v4(),
            key: ObjectKey::new("b", "n"),
            content_length: Declared::Valid(1_000),
            block_size: Declared::Valid(1),
            state: ManifestState::Writing,
            blocks_remaining: remaining,
            multipart: None,
            write_start_time: None,
            delete_marked_time: None,
            last_block_written_time: None,
        };
        let m = finalize(m);
        prop_assert_eq!(m.state, ManifestState::Active);
        prop_assert!(m.blocks_remaining.is_empty());
    }

    /// Reducing groups and then the group results equals reducing everything at once.
    #[test]
    fn prop_bucket_reduce_associative(
        lists in any_pair_lists(),
        cuts in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let whole = merge_pair_lists(lists.clone());
        let partials: Vec<BucketTally> = partition(&lists, &cuts)
            .into_iter()
            .flat_map(bucket_summary_reduce)
            .collect();
        prop_assert_eq!(merge_pair_lists(partials), whole);
    }

    /// Input order does not matter.
    #[test]
    fn prop_bucket_reduce_commutative(
        (lists, shuffled) in any_pair_lists().prop_flat_map(|lists| {
            (Just(lists.clone()), Just(lists).prop_shuffle())
        }),
    ) {
        prop_assert_eq!(merge_pair_lists(lists), merge_pair_lists(shuffled));
    }

    /// Size reduction is commutative, associative, and has (0, 0) as identity.
    #[test]
    fn prop_size_reduce_monoid(
        (sizes, shuffled) in proptest::collection::vec((0u64..1_000, 0u64..1_000_000), 0..30)
            .prop_map(|v| v.into_iter().map(|(c, b)| SizeTally::new(c, b)).collect::<Vec<_>>())
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        cuts in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let whole = size_reduce(sizes.clone());
        prop_assert_eq!(&size_reduce(shuffled), &whole);

        let partials: Vec<SizeTally> = partition(&sizes, &cuts)
            .into_iter()
            .flat_map(size_reduce)
            .collect();
        prop_assert_eq!(&size_reduce(partials), &whole);

        let mut padded = sizes.clone();
        padded.push(SizeTally::identity());
        prop_assert_eq!(&size_reduce(padded), &whole);
    }

    /// The whole map/reduce pipeline gives the same tally however objects are batched.
    #[test]
    fn prop_pipeline_batching_independent(
        values in proptest::collection::vec(any_object_value(), 0..12),
        cuts in proptest::collection::vec(any::<usize>(), 0..4),
    ) {
        let key = ObjectKey::new("bucket", "obj");
        let args = MapArgs { div_point: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() };

        let mapped: Vec<Vec<(BucketKey, u64)>> = values
            .iter()
            .flat_map(|v| bucket_summary_map(v, &key, &args))
            .collect();
        let whole = merge_pair_lists(mapped.clone());
        let partials: Vec<BucketTally> = partition(&mapped, &cuts)
            .into_iter()
            .flat_map(bucket_summary_reduce)
            .collect();
        prop_assert_eq!(merge_pair_lists(partials), whole);

        let sizes: Vec<SizeTally> = values.iter().flat_map(|v| size_map(v, &key)).collect();
        let found = values.iter().filter(|v| matches!(v, ObjectValue::Found(_))).count();
        prop_assert_eq!(sizes.len(), found);
    }

    /// Each found object maps to exactly 27 pairs, and in-flight multipart usage
    /// appears in both `user` and `wr_mp`.
    #[test]
    fn prop_map_output_shape(value in any_object_value()) {
        let key = ObjectKey::new("bucket", "obj");
        let args = MapArgs { div_point: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() };
        let out = bucket_summary_map(&value, &key, &args);
        match value {
            ObjectValue::NotFound => prop_assert!(out.is_empty()),
            ObjectValue::Found(_) => {
                prop_assert_eq!(out.len(), 1);
                prop_assert_eq!(out[0].len(), 27);
                let tally: BucketTally = out[0].iter().copied().collect();
                for metric in Metric::ALL {
                    prop_assert!(tally.get((Bucket::User, metric)) >= tally.get((Bucket::WrMp, metric)));
                }
            }
        }
    }
}
