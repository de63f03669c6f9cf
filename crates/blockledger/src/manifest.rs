//! Manifest data model.
//!
//! A manifest is one version of one object. All manifests sharing an [`ObjectKey`]
//! form that object's [`History`]. Manifests are read from the metadata store as
//! they were written, so sizes and timestamps are carried as [`Declared`] /
//! [`Timestamp`] values that tolerate malformed input instead of rejecting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of one manifest (object version).
pub type ManifestId = Uuid;

/// Logical identity of an object: its bucket plus its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Bucket (container) holding the object.
    pub bucket: String,
    /// Object name within the bucket.
    pub name: String,
}

impl ObjectKey {
    /// Creates a key from a bucket and an object name.
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.name)
    }
}

/// Lifecycle state of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestState {
    /// Blocks are still being written.
    Writing,
    /// All blocks written; the version is complete.
    Active,
    /// Deleted by the user, not yet handed to the garbage collector.
    PendingDelete,
    /// Handed to the garbage collector.
    ScheduledDelete,
}

impl fmt::Display for ManifestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestState::Writing => write!(f, "writing"),
            ManifestState::Active => write!(f, "active"),
            ManifestState::PendingDelete => write!(f, "pending_delete"),
            ManifestState::ScheduledDelete => write!(f, "scheduled_delete"),
        }
    }
}

/// A field as it was declared in a stored record.
///
/// `Valid` holds a value of the expected shape; anything else is kept verbatim in
/// `Invalid` so that consumers can degrade instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Declared<T> {
    /// Value of the expected shape.
    Valid(T),
    /// Missing or unrecognized value.
    Invalid(serde_json::Value),
}

impl<T> Declared<T> {
    /// Returns the value if it has the expected shape.
    pub fn valid(&self) -> Option<&T> {
        match self {
            Declared::Valid(v) => Some(v),
            Declared::Invalid(_) => None,
        }
    }

    /// Returns true if the value has the expected shape.
    pub fn is_valid(&self) -> bool {
        matches!(self, Declared::Valid(_))
    }
}

impl<T> Default for Declared<T> {
    fn default() -> Self {
        Declared::Invalid(serde_json::Value::Null)
    }
}

/// A point in time as recorded on a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// A well-formed UTC instant.
    Instant(DateTime<Utc>),
    /// Anything that does not parse as an instant.
    Malformed(serde_json::Value),
}

impl Timestamp {
    /// Returns the instant if well-formed.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Instant(at) => Some(*at),
            Timestamp::Malformed(_) => None,
        }
    }

    /// True iff this is a well-formed instant strictly after `point`.
    pub fn is_after(&self, point: DateTime<Utc>) -> bool {
        self.instant().is_some_and(|at| at > point)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Timestamp::Instant(at)
    }
}

/// One part of a multipart upload. Each part is chunked independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Part id; the part's blocks are addressed under it.
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    /// Declared byte length of the part.
    pub content_length: u64,
    /// Block size used for this part.
    pub block_size: u64,
}

impl Part {
    /// Creates a part descriptor with a fresh id.
    pub fn new(content_length: u64, block_size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_length,
            block_size,
        }
    }
}

/// Multipart sub-manifest: the parts of an object uploaded in segments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultipartInfo {
    /// Parts in upload order. Duplicates are not rejected here.
    pub parts: Vec<Part>,
}

impl MultipartInfo {
    /// Creates a sub-manifest from its parts.
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// Number of parts.
    pub fn part_count(&self) -> u64 {
        self.parts.len() as u64
    }

    /// Sum of the declared part lengths, or `None` if it does not fit in a `u64`.
    pub fn declared_bytes(&self) -> Option<u64> {
        self.parts
            .iter()
            .try_fold(0u64, |acc, p| acc.checked_add(p.content_length))
    }
}

/// One version of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version identifier.
    pub id: ManifestId,
    /// Object this version belongs to.
    pub key: ObjectKey,
    /// Byte size of the object, if known.
    #[serde(default)]
    pub content_length: Declared<u64>,
    /// Chunk size used for this version.
    #[serde(default)]
    pub block_size: Declared<u64>,
    /// Lifecycle state.
    pub state: ManifestState,
    /// Block sequence numbers not yet acknowledged by the write path.
    #[serde(default)]
    pub blocks_remaining: BTreeSet<u64>,
    /// Present for multipart versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipart: Option<Declared<MultipartInfo>>,
    /// When the write of this version started.
    #[serde(default)]
    pub write_start_time: Option<Timestamp>,
    /// When the version was marked for deletion.
    #[serde(default)]
    pub delete_marked_time: Option<Timestamp>,
    /// When the last block was acknowledged and the version finalized.
    #[serde(default)]
    pub last_block_written_time: Option<DateTime<Utc>>,
}

impl Manifest {
    /// True if this version carries a multipart sub-manifest, well-formed or not.
    pub fn is_multipart(&self) -> bool {
        self.multipart.is_some()
    }

    /// Content length if declared as an integer.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length.valid().copied()
    }

    /// Block size if declared as a positive integer.
    pub fn block_size(&self) -> Option<u64> {
        self.block_size.valid().copied().filter(|s| *s > 0)
    }
}

/// All manifests sharing one key, indexed by version id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// The object the history belongs to.
    pub key: ObjectKey,
    /// Versions by id.
    pub manifests: BTreeMap<ManifestId, Manifest>,
}

impl History {
    /// Creates an empty history for `key`.
    pub fn new(key: ObjectKey) -> Self {
        Self {
            key,
            manifests: BTreeMap::new(),
        }
    }

    /// Builds a history from a set of manifests.
    pub fn from_manifests(key: ObjectKey, manifests: impl IntoIterator<Item = Manifest>) -> Self {
        Self {
            key,
            manifests: manifests.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    /// Inserts or replaces a version.
    pub fn insert(&mut self, manifest: Manifest) {
        self.manifests.insert(manifest.id, manifest);
    }

    /// The user-visible version, as chosen by [`LatestActive`].
    pub fn active(&self) -> Option<&Manifest> {
        LatestActive.active_manifest(self)
    }

    /// Every version except the one with the given id.
    pub fn without(&self, id: Option<ManifestId>) -> impl Iterator<Item = &Manifest> {
        self.manifests
            .values()
            .filter(move |m| Some(m.id) != id)
    }

    /// Iterates over all versions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests.values()
    }

    /// Number of versions.
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Returns true if the history holds no versions.
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

/// Value of one map input: a resolved history, or nothing for tombstoned/absent keys.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectValue {
    /// The key resolved to a history.
    Found(History),
    /// The key is tombstoned or absent.
    NotFound,
}

impl From<Option<History>> for ObjectValue {
    fn from(value: Option<History>) -> Self {
        match value {
            Some(history) => ObjectValue::Found(history),
            None => ObjectValue::NotFound,
        }
    }
}

/// Selects the user-visible version out of a history.
///
/// Implementations are trusted to return at most one manifest, in state `active`.
pub trait ActiveManifestResolver: Send + Sync {
    /// Returns the active manifest of `history`, if any.
    fn active_manifest<'a>(&self, history: &'a History) -> Option<&'a Manifest>;
}

/// Picks the active manifest with the latest write start time.
///
/// Ties, and manifests without a well-formed start time, fall back to the
/// highest version id so the choice is deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestActive;

impl ActiveManifestResolver for LatestActive {
    fn active_manifest<'a>(&self, history: &'a History) -> Option<&'a Manifest> {
        history
            .iter()
            .filter(|m| m.state == ManifestState::Active)
            .max_by_key(|m| {
                (
                    m.write_start_time.as_ref().and_then(Timestamp::instant),
                    m.id,
                )
            })
    }
}
