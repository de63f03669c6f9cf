//! Per-manifest usage classification.
//!
//! [`classify`] turns one manifest into a `(kind, state, usage)` triple. It never
//! fails: a manifest whose sizes cannot be read is counted as one object with no
//! bytes and no blocks, and the diagnostic sink is told about it.

use crate::block::block_count;
use crate::diagnostics::{DiagnosticContext, DiagnosticSink, Severity};
use crate::manifest::{Declared, Manifest, ManifestState, MultipartInfo};
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Whether a manifest describes a multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    /// Single-part object.
    NonMultipart,
    /// Object uploaded in parts.
    Multipart,
}

/// Object, byte and block counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of objects (or parts, for multipart versions).
    pub count: u64,
    /// Number of bytes.
    pub bytes: u64,
    /// Number of blocks.
    pub blocks: u64,
}

impl Usage {
    /// Estimate used for records whose sizes cannot be read.
    pub const DEGRADED: Usage = Usage {
        count: 1,
        bytes: 0,
        blocks: 0,
    };

    /// Creates a usage triple.
    pub fn new(count: u64, bytes: u64, blocks: u64) -> Self {
        Self {
            count,
            bytes,
            blocks,
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            count: self.count.saturating_add(rhs.count),
            bytes: self.bytes.saturating_add(rhs.bytes),
            blocks: self.blocks.saturating_add(rhs.blocks),
        }
    }
}

/// Result of classifying one manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Multipart or not.
    pub kind: ManifestKind,
    /// Lifecycle state of the manifest.
    pub state: ManifestState,
    /// Counted usage.
    pub usage: Usage,
}

/// Classifies one manifest.
///
/// - Single-part with integer length and block size: one object, its length, and
///   its block count.
/// - Active multipart with integer length: one count per part, the consolidated
///   length, and blocks recomputed per part.
/// - Multipart in any other condition: bytes and blocks estimated from declared
///   part lengths. This may overestimate, which is the preferred error for
///   capacity accounting.
/// - Anything unreadable: [`Usage::DEGRADED`].
pub fn classify(manifest: &Manifest, sink: &dyn DiagnosticSink) -> Classification {
    let state = manifest.state;
    match &manifest.multipart {
        None => {
            let usage = match (manifest.content_length(), manifest.block_size()) {
                (Some(len), Some(size)) => Usage::new(1, len, block_count(len, size)),
                _ => degrade(
                    manifest,
                    sink,
                    "content length or block size missing or not an integer",
                ),
            };
            Classification {
                kind: ManifestKind::NonMultipart,
                state,
                usage,
            }
        }
        Some(Declared::Valid(mp)) => {
            let usage = match (part_blocks(mp), mp.declared_bytes()) {
                (Err(reason), _) => degrade(manifest, sink, reason),
                (Ok(_), None) => degrade(manifest, sink, "multipart part lengths overflow"),
                (Ok(blocks), Some(declared)) => match (state, manifest.content_length()) {
                    (ManifestState::Active, Some(len)) => Usage::new(mp.part_count(), len, blocks),
                    _ => Usage::new(mp.part_count(), declared, blocks),
                },
            };
            Classification {
                kind: ManifestKind::Multipart,
                state,
                usage,
            }
        }
        Some(Declared::Invalid(_)) => Classification {
            kind: ManifestKind::Multipart,
            state,
            usage: degrade(manifest, sink, "unrecognized multipart sub-manifest"),
        },
    }
}

/// Blocks of all parts, each chunked with its own block size.
fn part_blocks(mp: &MultipartInfo) -> Result<u64, &'static str> {
    mp.parts.iter().try_fold(0u64, |acc, p| {
        if p.block_size == 0 {
            return Err("multipart part has a zero block size");
        }
        acc.checked_add(block_count(p.content_length, p.block_size))
            .ok_or("multipart part block counts overflow")
    })
}

fn degrade(manifest: &Manifest, sink: &dyn DiagnosticSink, message: &str) -> Usage {
    sink.report(
        Severity::Warning,
        message,
        DiagnosticContext {
            key: &manifest.key,
            manifest: Some(manifest.id),
        },
    );
    Usage::DEGRADED
}
