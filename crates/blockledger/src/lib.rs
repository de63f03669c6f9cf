#![warn(missing_docs)]

//! Block tracking and usage accounting for chunked, versioned object storage
//!
//! Write path: new manifest → acknowledge blocks → finalize (writing → active)
//! Usage path: history → classify each manifest → nine buckets → reduce across objects

pub mod aggregate;
pub mod block;
pub mod classify;
pub mod cli;
pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod job;
pub mod manifest;
pub mod reduce;

pub use aggregate::{object_size, route, Bucket, BucketKey, BucketSummary, Metric, Route, UsageAggregator};
pub use block::{
    block_count, block_keynames, block_name, block_name_to_term, block_sequences_for_manifest,
    initial_blocks, safe_block_size, BlockAddress,
};
pub use classify::{classify, Classification, ManifestKind, Usage};
pub use completion::{
    finalize, finalize_at, new_manifest, remove_block, sorted_remaining, still_waiting,
};
pub use config::LedgerConfig;
pub use diagnostics::{Diagnostic, DiagnosticContext, DiagnosticSink, MemorySink, Severity, TracingSink};
pub use error::{LedgerError, LedgerResult};
pub use job::{
    bucket_summary_map, bucket_summary_map_with, bucket_summary_reduce, size_map, size_map_with,
    size_reduce, JobInput, LocalJob, MapArgs,
};
pub use manifest::{
    ActiveManifestResolver, Declared, History, LatestActive, Manifest, ManifestId, ManifestState,
    MultipartInfo, ObjectKey, ObjectValue, Part, Timestamp,
};
pub use reduce::{merge_pair_lists, BucketTally, Monoid, SizeTally, TallyRow};
