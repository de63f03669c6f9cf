//! Map/reduce contract for usage jobs, and an in-process executor for it.
//!
//! Each map invocation handles one object independently and returns a list with
//! one element, or an empty list when the key is tombstoned or absent. Reduce
//! invocations accept map outputs and earlier reduce outputs alike and always
//! return a list with exactly one merged element.

use crate::aggregate::{BucketKey, UsageAggregator};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::manifest::{History, ObjectKey, ObjectValue};
use crate::reduce::{merge_pair_lists, BucketTally, Monoid, SizeTally};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Arguments of the bucket-summary map phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapArgs {
    /// Cutoff between "new" and "old" records.
    pub div_point: DateTime<Utc>,
}

/// Bucket-summary map with the default resolver and diagnostic sink.
pub fn bucket_summary_map(
    value: &ObjectValue,
    key: &ObjectKey,
    args: &MapArgs,
) -> Vec<Vec<(BucketKey, u64)>> {
    bucket_summary_map_with(&UsageAggregator::new(args.div_point), value, key)
}

/// Bucket-summary map using `aggregator`.
pub fn bucket_summary_map_with(
    aggregator: &UsageAggregator,
    value: &ObjectValue,
    key: &ObjectKey,
) -> Vec<Vec<(BucketKey, u64)>> {
    match value {
        ObjectValue::Found(_) => vec![aggregator.bucket_pairs(value)],
        ObjectValue::NotFound => {
            debug!(key = %key, "Object not found, contributing nothing");
            Vec::new()
        }
    }
}

/// Merges map outputs and partial tallies into one tally.
pub fn bucket_summary_reduce<I, P>(inputs: I) -> Vec<BucketTally>
where
    I: IntoIterator<Item = P>,
    P: IntoIterator<Item = (BucketKey, u64)>,
{
    vec![merge_pair_lists(inputs)]
}

/// Size map with the default resolver and diagnostic sink.
pub fn size_map(value: &ObjectValue, key: &ObjectKey) -> Vec<SizeTally> {
    size_map_with(&UsageAggregator::new(Utc::now()), value, key)
}

/// Size map using `aggregator`.
pub fn size_map_with(
    aggregator: &UsageAggregator,
    value: &ObjectValue,
    key: &ObjectKey,
) -> Vec<SizeTally> {
    match value {
        ObjectValue::Found(history) => vec![aggregator.object_size(history)],
        ObjectValue::NotFound => {
            debug!(key = %key, "Object not found, contributing nothing");
            Vec::new()
        }
    }
}

/// Sums size pairs; `(0, 0)` for no input.
pub fn size_reduce(inputs: impl IntoIterator<Item = SizeTally>) -> Vec<SizeTally> {
    vec![SizeTally::concat(inputs)]
}

/// One map input: an object key and its history, if it resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    /// Object key.
    pub key: ObjectKey,
    /// History, or `null` for tombstoned/absent keys.
    pub value: Option<History>,
}

impl JobInput {
    /// The map value of this input.
    pub fn object_value(&self) -> ObjectValue {
        self.value.clone().into()
    }
}

/// Runs usage jobs in-process.
///
/// Inputs are split into batches; each batch is mapped and reduced on its own
/// task and the partial results are reduced once more.
#[derive(Debug, Clone)]
pub struct LocalJob {
    aggregator: UsageAggregator,
    partitions: usize,
    shuffle: bool,
    shuffle_seed: Option<u64>,
}

impl LocalJob {
    /// Creates a job from configuration, using the default resolver and sink.
    pub fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self {
            aggregator: UsageAggregator::new(config.div_point()),
            partitions: config.partitions,
            shuffle: config.shuffle_inputs,
            shuffle_seed: config.shuffle_seed,
        })
    }

    /// Replaces the aggregator.
    pub fn with_aggregator(mut self, aggregator: UsageAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// The aggregator used by the map phase.
    pub fn aggregator(&self) -> &UsageAggregator {
        &self.aggregator
    }

    fn batches(&self, mut inputs: Vec<JobInput>) -> Vec<Vec<JobInput>> {
        if self.shuffle {
            let mut rng = match self.shuffle_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            inputs.shuffle(&mut rng);
        }
        let size = inputs.len().div_ceil(self.partitions.max(1)).max(1);
        let mut batches = Vec::with_capacity(self.partitions);
        while !inputs.is_empty() {
            let rest = inputs.split_off(size.min(inputs.len()));
            batches.push(std::mem::replace(&mut inputs, rest));
        }
        batches
    }

    /// Bucket totals over all inputs.
    pub async fn bucket_summary(&self, inputs: Vec<JobInput>) -> LedgerResult<BucketTally> {
        let total = inputs.len();
        let mut tasks = JoinSet::new();
        for batch in self.batches(inputs) {
            let aggregator = self.aggregator.clone();
            tasks.spawn_blocking(move || {
                let mapped = batch.iter().flat_map(|input| {
                    bucket_summary_map_with(&aggregator, &input.object_value(), &input.key)
                });
                bucket_summary_reduce(mapped)
            });
        }

        let mut partials = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            partials.extend(joined.map_err(job_err)?);
        }
        info!(objects = total, batches = partials.len(), "Bucket summary complete");
        Ok(merge_pair_lists(partials))
    }

    /// Object and byte totals over all inputs.
    pub async fn object_sizes(&self, inputs: Vec<JobInput>) -> LedgerResult<SizeTally> {
        let total = inputs.len();
        let mut tasks = JoinSet::new();
        for batch in self.batches(inputs) {
            let aggregator = self.aggregator.clone();
            tasks.spawn_blocking(move || {
                let mapped = batch
                    .iter()
                    .flat_map(|input| size_map_with(&aggregator, &input.object_value(), &input.key));
                size_reduce(mapped)
            });
        }

        let mut partials = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            partials.extend(joined.map_err(job_err)?);
        }
        info!(objects = total, batches = partials.len(), "Object size job complete");
        Ok(SizeTally::concat(partials))
    }
}

fn job_err(e: tokio::task::JoinError) -> LedgerError {
    LedgerError::Job {
        reason: e.to_string(),
    }
}
