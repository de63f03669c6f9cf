//! Usage aggregation over an object's version history.
//!
//! Every manifest of a history lands in one of nine buckets:
//!
//! | bucket   | contents                                                    |
//! |----------|-------------------------------------------------------------|
//! | `user`   | the user-visible version, plus in-flight multipart uploads  |
//! | `ac_de`  | other active-looking versions (orphaned, not visible)       |
//! | `wr_mp`  | in-flight multipart uploads                                 |
//! | `wr_new` | single-part writes started after the cutoff                 |
//! | `wr_old` | single-part writes started at or before the cutoff          |
//! | `pd_new` / `pd_old` | versions pending deletion, split by mark time    |
//! | `sd_new` / `sd_old` | versions scheduled for collection, same split    |
//!
//! In-flight multipart uploads are counted twice, in `user` and in `wr_mp`.

use crate::classify::{classify, Classification, ManifestKind, Usage};
use crate::diagnostics::{DiagnosticContext, DiagnosticSink, Severity, TracingSink};
use crate::manifest::{
    ActiveManifestResolver, Declared, History, LatestActive, Manifest, ManifestState,
    ObjectValue, Timestamp,
};
use crate::reduce::SizeTally;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Accounting bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// User-visible storage.
    User,
    /// Active but not user-visible.
    AcDe,
    /// Multipart upload in progress.
    WrMp,
    /// Recent write in progress.
    WrNew,
    /// Stale write in progress.
    WrOld,
    /// Recently marked for deletion.
    PdNew,
    /// Marked for deletion a while ago.
    PdOld,
    /// Recently scheduled for collection.
    SdNew,
    /// Scheduled for collection a while ago.
    SdOld,
}

impl Bucket {
    /// All buckets, in output order.
    pub const ALL: [Bucket; 9] = [
        Bucket::User,
        Bucket::AcDe,
        Bucket::WrMp,
        Bucket::WrNew,
        Bucket::WrOld,
        Bucket::PdNew,
        Bucket::PdOld,
        Bucket::SdNew,
        Bucket::SdOld,
    ];

    /// Wire name of the bucket.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::User => "user",
            Bucket::AcDe => "ac_de",
            Bucket::WrMp => "wr_mp",
            Bucket::WrNew => "wr_new",
            Bucket::WrOld => "wr_old",
            Bucket::PdNew => "pd_new",
            Bucket::PdOld => "pd_old",
            Bucket::SdNew => "sd_new",
            Bucket::SdOld => "sd_old",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quantity measured in a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Objects (or parts).
    Count,
    /// Bytes.
    Bytes,
    /// Blocks.
    Blocks,
}

impl Metric {
    /// All metrics, in output order.
    pub const ALL: [Metric; 3] = [Metric::Count, Metric::Bytes, Metric::Blocks];

    /// Wire name of the metric.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Count => "count",
            Metric::Bytes => "bytes",
            Metric::Blocks => "blocks",
        }
    }

    /// Picks this metric out of a usage triple.
    pub fn of(&self, usage: Usage) -> u64 {
        match self {
            Metric::Count => usage.count,
            Metric::Bytes => usage.bytes,
            Metric::Blocks => usage.blocks,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one flattened bucket value.
pub type BucketKey = (Bucket, Metric);

/// Where a classified manifest is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Counted once.
    One(Bucket, Usage),
    /// Counted in both buckets.
    Both(Bucket, Bucket, Usage),
}

/// Usage per bucket for one object. Values only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketSummary {
    buckets: [Usage; 9],
}

impl BucketSummary {
    /// Usage recorded in `bucket`.
    pub fn get(&self, bucket: Bucket) -> Usage {
        self.buckets[bucket.index()]
    }

    /// Returns the summary with `usage` added to `bucket`.
    pub fn with_added(mut self, bucket: Bucket, usage: Usage) -> Self {
        let slot = &mut self.buckets[bucket.index()];
        *slot = *slot + usage;
        self
    }

    /// Returns the summary with a routed usage applied.
    pub fn apply(self, route: Route) -> Self {
        match route {
            Route::One(bucket, usage) => self.with_added(bucket, usage),
            Route::Both(first, second, usage) => {
                self.with_added(first, usage).with_added(second, usage)
            }
        }
    }

    /// Flattens to 27 `((bucket, metric), value)` pairs in [`Bucket::ALL`] x
    /// [`Metric::ALL`] order, zeros included.
    pub fn to_pairs(&self) -> Vec<(BucketKey, u64)> {
        Bucket::ALL
            .iter()
            .flat_map(|bucket| {
                let usage = self.get(*bucket);
                Metric::ALL
                    .iter()
                    .map(move |metric| ((*bucket, *metric), metric.of(usage)))
            })
            .collect()
    }
}

/// "new" iff `ts` is a well-formed instant strictly after `div_point`.
fn is_new(ts: Option<&Timestamp>, div_point: DateTime<Utc>) -> bool {
    ts.is_some_and(|ts| ts.is_after(div_point))
}

fn by_age(ts: Option<&Timestamp>, div_point: DateTime<Utc>, new: Bucket, old: Bucket) -> Bucket {
    if is_new(ts, div_point) {
        new
    } else {
        old
    }
}

/// Routes a manifest that is not the user-visible version.
pub fn route(c: &Classification, manifest: &Manifest, div_point: DateTime<Utc>) -> Route {
    match (c.kind, c.state) {
        (_, ManifestState::Active) => Route::One(Bucket::AcDe, c.usage),
        (ManifestKind::Multipart, ManifestState::Writing) => {
            Route::Both(Bucket::User, Bucket::WrMp, c.usage)
        }
        (ManifestKind::NonMultipart, ManifestState::Writing) => Route::One(
            by_age(
                manifest.write_start_time.as_ref(),
                div_point,
                Bucket::WrNew,
                Bucket::WrOld,
            ),
            c.usage,
        ),
        (_, ManifestState::PendingDelete) => Route::One(
            by_age(
                manifest.delete_marked_time.as_ref(),
                div_point,
                Bucket::PdNew,
                Bucket::PdOld,
            ),
            c.usage,
        ),
        (_, ManifestState::ScheduledDelete) => Route::One(
            by_age(
                manifest.delete_marked_time.as_ref(),
                div_point,
                Bucket::SdNew,
                Bucket::SdOld,
            ),
            c.usage,
        ),
    }
}

/// Computes bucket summaries and object sizes for histories.
#[derive(Clone)]
pub struct UsageAggregator {
    div_point: DateTime<Utc>,
    resolver: Arc<dyn ActiveManifestResolver>,
    sink: Arc<dyn DiagnosticSink>,
}

impl fmt::Debug for UsageAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageAggregator")
            .field("div_point", &self.div_point)
            .finish_non_exhaustive()
    }
}

impl UsageAggregator {
    /// Aggregator using [`LatestActive`] and logging diagnostics through `tracing`.
    pub fn new(div_point: DateTime<Utc>) -> Self {
        Self {
            div_point,
            resolver: Arc::new(LatestActive),
            sink: Arc::new(TracingSink),
        }
    }

    /// Replaces the active-manifest resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ActiveManifestResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the diagnostic sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The "new"/"old" cutoff.
    pub fn div_point(&self) -> DateTime<Utc> {
        self.div_point
    }

    /// Classifies every version of `history` into buckets.
    ///
    /// The active version is counted in `user` and excluded from the rest of the
    /// fold.
    pub fn summarize(&self, history: &History) -> BucketSummary {
        let sink = self.sink.as_ref();
        let active = self.resolver.active_manifest(history);
        let start = match active {
            Some(m) => BucketSummary::default().apply(Route::One(Bucket::User, classify(m, sink).usage)),
            None => BucketSummary::default(),
        };

        history.without(active.map(|m| m.id)).fold(start, |acc, m| {
            let r = route(&classify(m, sink), m, self.div_point);
            trace!(key = %history.key, id = %m.id, route = ?r, "Routed manifest");
            acc.apply(r)
        })
    }

    /// Flattened summary for one map input; empty for tombstoned or absent keys.
    pub fn bucket_pairs(&self, value: &ObjectValue) -> Vec<(BucketKey, u64)> {
        match value {
            ObjectValue::Found(history) => self.summarize(history).to_pairs(),
            ObjectValue::NotFound => Vec::new(),
        }
    }

    /// Visible size of `history`; see [`object_size`].
    pub fn object_size(&self, history: &History) -> SizeTally {
        object_size(history, self.resolver.as_ref(), self.sink.as_ref())
    }
}

/// Visible size of one object: the active version counted as one object of its
/// length, plus every in-flight multipart upload counted by its parts.
///
/// Unreadable multipart data, including part lengths that overflow, contributes
/// nothing.
pub fn object_size(
    history: &History,
    resolver: &dyn ActiveManifestResolver,
    sink: &dyn DiagnosticSink,
) -> SizeTally {
    let active = resolver.active_manifest(history);
    let start = match active {
        Some(m) => match m.content_length() {
            Some(len) => SizeTally::new(1, len),
            None => {
                sink.report(
                    Severity::Warning,
                    "active manifest has no integer content length",
                    DiagnosticContext {
                        key: &history.key,
                        manifest: Some(m.id),
                    },
                );
                SizeTally::new(1, 0)
            }
        },
        None => SizeTally::default(),
    };

    history
        .without(active.map(|m| m.id))
        .filter(|m| m.state == ManifestState::Writing)
        .fold(start, |acc, m| match &m.multipart {
            Some(Declared::Valid(mp)) => match mp.declared_bytes() {
                Some(bytes) => acc + SizeTally::new(mp.part_count(), bytes),
                None => {
                    sink.report(
                        Severity::Warning,
                        "multipart part lengths overflow",
                        DiagnosticContext {
                            key: &history.key,
                            manifest: Some(m.id),
                        },
                    );
                    acc
                }
            },
            _ => acc,
        })
}
