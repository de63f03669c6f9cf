//! Reduction of per-object results.
//!
//! The executing job may batch, split and reorder map outputs arbitrarily, and may
//! feed partial reductions back into further reductions. Both result shapes are
//! therefore monoids: an identity plus a combine operator that is associative and
//! commutative.
//!
//! ```text
//! combine(identity(), a)         = a
//! combine(a, b)                  = combine(b, a)
//! combine(combine(a, b), c)      = combine(a, combine(b, c))
//! ```

use crate::aggregate::{Bucket, BucketKey, Metric};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Add;

/// A value with an identity and an associative, commutative combine.
pub trait Monoid: Sized {
    /// The neutral element.
    fn identity() -> Self;

    /// Merges two values.
    fn combine(self, other: Self) -> Self;

    /// Merges any number of values; the identity for none.
    fn concat<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        items.into_iter().fold(Self::identity(), Self::combine)
    }
}

/// Running totals keyed by `(bucket, metric)`. Unseen keys read as zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BucketTally {
    values: BTreeMap<BucketKey, u64>,
}

/// One row of a [`BucketTally`], for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyRow {
    /// Bucket name.
    pub bucket: Bucket,
    /// Metric name.
    pub metric: Metric,
    /// Summed value.
    pub value: u64,
}

impl BucketTally {
    /// Creates an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tally with `value` added under `key`.
    pub fn add(mut self, key: BucketKey, value: u64) -> Self {
        let slot = self.values.entry(key).or_insert(0);
        *slot = slot.saturating_add(value);
        self
    }

    /// Current total for `key`.
    pub fn get(&self, key: BucketKey) -> u64 {
        self.values.get(&key).copied().unwrap_or(0)
    }

    /// Totals in key order.
    pub fn iter(&self) -> impl Iterator<Item = (BucketKey, u64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    /// Number of keys seen.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no key has been seen.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All 27 bucket/metric rows in output order, zeros included.
    pub fn rows(&self) -> Vec<TallyRow> {
        Bucket::ALL
            .iter()
            .flat_map(|bucket| {
                Metric::ALL.iter().map(move |metric| TallyRow {
                    bucket: *bucket,
                    metric: *metric,
                    value: self.get((*bucket, *metric)),
                })
            })
            .collect()
    }
}

impl FromIterator<(BucketKey, u64)> for BucketTally {
    fn from_iter<I: IntoIterator<Item = (BucketKey, u64)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(BucketTally::new(), |acc, (key, value)| acc.add(key, value))
    }
}

impl IntoIterator for BucketTally {
    type Item = (BucketKey, u64);
    type IntoIter = btree_map::IntoIter<BucketKey, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl Monoid for BucketTally {
    fn identity() -> Self {
        BucketTally::new()
    }

    fn combine(self, other: Self) -> Self {
        let (mut big, small) = if self.values.len() >= other.values.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (key, value) in small.values {
            let slot = big.values.entry(key).or_insert(0);
            *slot = slot.saturating_add(value);
        }
        big
    }
}

/// `(objects, bytes)` pair produced by the size job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SizeTally {
    /// Number of objects (or in-flight parts).
    pub count: u64,
    /// Number of bytes.
    pub bytes: u64,
}

impl SizeTally {
    /// Creates a size pair.
    pub fn new(count: u64, bytes: u64) -> Self {
        Self { count, bytes }
    }
}

impl Add for SizeTally {
    type Output = SizeTally;

    fn add(self, rhs: SizeTally) -> SizeTally {
        SizeTally {
            count: self.count.saturating_add(rhs.count),
            bytes: self.bytes.saturating_add(rhs.bytes),
        }
    }
}

impl Monoid for SizeTally {
    fn identity() -> Self {
        SizeTally::default()
    }

    fn combine(self, other: Self) -> Self {
        self + other
    }
}

/// Merges flattened pair lists (map outputs or earlier tallies) into one tally.
pub fn merge_pair_lists<I, P>(lists: I) -> BucketTally
where
    I: IntoIterator<Item = P>,
    P: IntoIterator<Item = (BucketKey, u64)>,
{
    BucketTally::concat(
        lists
            .into_iter()
            .map(|list| list.into_iter().collect::<BucketTally>()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(bucket: Bucket, metric: Metric) -> BucketKey {
        (bucket, metric)
    }

    #[test]
    fn test_unseen_key_is_zero() {
        let tally = BucketTally::new();
        assert_eq!(tally.get(key(Bucket::User, Metric::Bytes)), 0);
        assert!(tally.is_empty());
    }

    #[test]
    fn test_add_accumulates() {
        let tally = BucketTally::new()
            .add(key(Bucket::User, Metric::Count), 1)
            .add(key(Bucket::User, Metric::Count), 2);
        assert_eq!(tally.get(key(Bucket::User, Metric::Count)), 3);
        assert_eq!(tally.len(), 1);
    }

    #[test]
    fn test_combine_sums_overlapping_keys() {
        let a: BucketTally = vec![
            (key(Bucket::User, Metric::Count), 1),
            (key(Bucket::WrMp, Metric::Bytes), 10),
        ]
        .into_iter()
        .collect();
        let b: BucketTally = vec![(key(Bucket::User, Metric::Count), 4)].into_iter().collect();

        let ab = a.clone().combine(b.clone());
        assert_eq!(ab, b.combine(a));
        assert_eq!(ab.get(key(Bucket::User, Metric::Count)), 5);
        assert_eq!(ab.get(key(Bucket::WrMp, Metric::Bytes)), 10);
    }

    #[test]
    fn test_identity_is_neutral() {
        let a: BucketTally = vec![(key(Bucket::SdOld, Metric::Blocks), 7)].into_iter().collect();
        assert_eq!(a.clone().combine(BucketTally::identity()), a);
        assert_eq!(BucketTally::identity().combine(a.clone()), a);
        assert_eq!(SizeTally::identity().combine(SizeTally::new(2, 3)), SizeTally::new(2, 3));
    }

    #[test]
    fn test_merge_pair_lists_accepts_empty_lists() {
        let lists: Vec<Vec<(BucketKey, u64)>> = vec![
            Vec::new(),
            vec![(key(Bucket::User, Metric::Bytes), 100)],
            Vec::new(),
        ];
        let tally = merge_pair_lists(lists);
        assert_eq!(tally.get(key(Bucket::User, Metric::Bytes)), 100);
        assert_eq!(tally.len(), 1);

        let none: Vec<Vec<(BucketKey, u64)>> = Vec::new();
        assert!(merge_pair_lists(none).is_empty());
    }

    #[test]
    fn test_merge_pair_lists_accepts_tallies() {
        let partial = merge_pair_lists(vec![vec![(key(Bucket::PdNew, Metric::Count), 2)]]);
        let merged = merge_pair_lists(vec![partial.clone(), partial]);
        assert_eq!(merged.get(key(Bucket::PdNew, Metric::Count)), 4);
    }

    #[test]
    fn test_rows_cover_every_key() {
        let tally = BucketTally::new().add(key(Bucket::AcDe, Metric::Blocks), 9);
        let rows = tally.rows();
        assert_eq!(rows.len(), 27);
        assert_eq!(
            rows[5],
            TallyRow {
                bucket: Bucket::AcDe,
                metric: Metric::Blocks,
                value: 9
            }
        );
    }

    #[test]
    fn test_size_concat() {
        let total = SizeTally::concat(vec![SizeTally::new(1, 100), SizeTally::default(), SizeTally::new(2, 80)]);
        assert_eq!(total, SizeTally::new(3, 180));
        assert_eq!(SizeTally::concat(Vec::new()), SizeTally::new(0, 0));
    }

    #[test]
    fn test_sums_saturate() {
        let k = key(Bucket::User, Metric::Bytes);
        let near_max = BucketTally::new().add(k, u64::MAX - 1);
        assert_eq!(near_max.clone().add(k, 5).get(k), u64::MAX);

        let other = BucketTally::new().add(k, 3);
        assert_eq!(near_max.clone().combine(other.clone()).get(k), u64::MAX);
        assert_eq!(other.combine(near_max).get(k), u64::MAX);

        assert_eq!(
            SizeTally::new(u64::MAX, 1) + SizeTally::new(1, u64::MAX),
            SizeTally::new(u64::MAX, u64::MAX)
        );
    }
}
