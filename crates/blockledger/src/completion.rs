//! Completion tracking for in-progress writes.
//!
//! [`new_manifest`] starts a version in `writing` with every block id outstanding.
//! The write path acknowledges blocks one at a time through [`remove_block`]; once
//! [`still_waiting`] turns false it calls [`finalize`].
//!
//! All operations take the manifest by value and hand back the updated one.

use crate::block::initial_blocks;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::manifest::{Declared, Manifest, ManifestState, ObjectKey};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Starts a new version of `key` in state `writing`, with a fresh id and every
/// block outstanding.
pub fn new_manifest(
    key: ObjectKey,
    content_length: u64,
    config: &LedgerConfig,
) -> LedgerResult<Manifest> {
    if content_length > config.max_content_length {
        return Err(LedgerError::ContentTooLarge {
            length: content_length,
            max: config.max_content_length,
        });
    }
    let block_size = config.block_size();
    let manifest = Manifest {
        id: Uuid::new_v4(),
        key,
        content_length: Declared::Valid(content_length),
        block_size: Declared::Valid(block_size),
        state: ManifestState::Writing,
        blocks_remaining: initial_blocks(content_length, block_size),
        multipart: None,
        write_start_time: Some(Utc::now().into()),
        delete_marked_time: None,
        last_block_written_time: None,
    };
    info!(
        key = %manifest.key,
        id = %manifest.id,
        content_length,
        blocks = manifest.blocks_remaining.len(),
        "Created manifest"
    );
    Ok(manifest)
}

/// Marks block `seq` as written. Removing an id that is not outstanding is a no-op.
pub fn remove_block(mut manifest: Manifest, seq: u64) -> Manifest {
    if manifest.blocks_remaining.remove(&seq) {
        debug!(
            key = %manifest.key,
            id = %manifest.id,
            seq,
            remaining = manifest.blocks_remaining.len(),
            "Block acknowledged"
        );
    }
    manifest
}

/// True while any block is still outstanding.
pub fn still_waiting(manifest: &Manifest) -> bool {
    !manifest.blocks_remaining.is_empty()
}

/// Outstanding block ids in ascending order.
pub fn sorted_remaining(manifest: &Manifest) -> Vec<u64> {
    manifest.blocks_remaining.iter().copied().collect()
}

/// Transitions the manifest to `active`, stamping the current time.
///
/// # Caller contract
///
/// This does **not** check that every block has been acknowledged. Call it only
/// once [`still_waiting`] returns false; any ids still outstanding are discarded
/// and the version becomes active regardless. It never fails.
pub fn finalize(manifest: Manifest) -> Manifest {
    finalize_at(manifest, Utc::now())
}

/// [`finalize`] with an explicit completion time.
pub fn finalize_at(mut manifest: Manifest, at: DateTime<Utc>) -> Manifest {
    if still_waiting(&manifest) {
        debug!(
            key = %manifest.key,
            id = %manifest.id,
            outstanding = manifest.blocks_remaining.len(),
            "Finalizing manifest with outstanding blocks"
        );
    }
    manifest.state = ManifestState::Active;
    manifest.blocks_remaining.clear();
    manifest.last_block_written_time = Some(at);
    manifest
}
