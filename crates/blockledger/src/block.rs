//! Block arithmetic: how an object is split into fixed-size blocks, and how each
//! block is addressed in the block store.

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::manifest::{Declared, Manifest, ManifestId, ObjectKey};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Number of blocks needed to hold `length` bytes at `block_size` bytes per block.
///
/// `block_size` must be non-zero; callers validate it.
pub fn block_count(length: u64, block_size: u64) -> u64 {
    length.div_ceil(block_size)
}

/// The full set of block ids for a fresh write: `0..block_count`.
pub fn initial_blocks(length: u64, block_size: u64) -> BTreeSet<u64> {
    (0..block_count(length, block_size)).collect()
}

/// Block size to use for `manifest`, falling back to the configured size and
/// never exceeding the configured ceiling.
pub fn safe_block_size(manifest: &Manifest, config: &LedgerConfig) -> u64 {
    manifest
        .block_size()
        .unwrap_or_else(|| config.block_size())
        .min(config.max_block_size)
}

/// Storage address of one chunk: (object key, version id, sequence number).
///
/// Layout: `u32` bucket length, bucket bytes, `u32` name length, name bytes,
/// 16 id bytes, `u64` sequence, all integers big-endian. Fails if the bucket or
/// the name is longer than `u32::MAX` bytes.
pub fn block_name(key: &ObjectKey, id: ManifestId, seq: u64) -> LedgerResult<Bytes> {
    let bucket_len = segment_len(key.bucket.len(), "bucket")?;
    let name_len = segment_len(key.name.len(), "name")?;
    let mut buf =
        BytesMut::with_capacity(4 + key.bucket.len() + 4 + key.name.len() + 16 + 8);
    buf.put_u32(bucket_len);
    buf.put_slice(key.bucket.as_bytes());
    buf.put_u32(name_len);
    buf.put_slice(key.name.as_bytes());
    buf.put_slice(id.as_bytes());
    buf.put_u64(seq);
    Ok(buf.freeze())
}

fn segment_len(len: usize, field: &str) -> LedgerResult<u32> {
    u32::try_from(len).map_err(|_| LedgerError::BlockNameEncode {
        reason: format!("{} is {} bytes, over the {} byte limit", field, len, u32::MAX),
    })
}

/// Inverse of [`block_name`].
pub fn block_name_to_term(name: &[u8]) -> LedgerResult<(ObjectKey, ManifestId, u64)> {
    let mut buf = name;
    let bucket = take_string(&mut buf, "bucket")?;
    let object = take_string(&mut buf, "name")?;
    if buf.remaining() < 16 + 8 {
        return Err(decode_err("truncated id or sequence"));
    }
    let mut id = [0u8; 16];
    buf.copy_to_slice(&mut id);
    let seq = buf.get_u64();
    if buf.has_remaining() {
        return Err(decode_err(format!("{} trailing bytes", buf.remaining())));
    }
    Ok((ObjectKey::new(bucket, object), Uuid::from_bytes(id), seq))
}

fn take_string(buf: &mut &[u8], field: &str) -> LedgerResult<String> {
    if buf.remaining() < 4 {
        return Err(decode_err(format!("truncated {} length", field)));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(decode_err(format!("truncated {}", field)));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|e| decode_err(format!("{} is not utf-8: {}", field, e)))
}

fn decode_err(reason: impl Into<String>) -> LedgerError {
    LedgerError::BlockNameDecode {
        reason: reason.into(),
    }
}

/// Pairs each sequence number with its block name.
pub fn block_keynames(
    key: &ObjectKey,
    id: ManifestId,
    seqs: impl IntoIterator<Item = u64>,
) -> LedgerResult<Vec<(u64, Bytes)>> {
    seqs.into_iter()
        .map(|seq| Ok((seq, block_name(key, id, seq)?)))
        .collect()
}

/// Address of one stored block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockAddress {
    /// Version (or multipart part) the block belongs to.
    pub version: Uuid,
    /// Sequence number within that version or part.
    pub seq: u64,
}

impl BlockAddress {
    /// Block name of this address under `key`.
    pub fn name(&self, key: &ObjectKey) -> LedgerResult<Bytes> {
        block_name(key, self.version, self.seq)
    }
}

/// Every block a version occupies, for the read and delete paths.
///
/// Multipart versions address blocks per part. A version whose sizes are unusable
/// yields no blocks.
pub fn block_sequences_for_manifest(manifest: &Manifest) -> Vec<BlockAddress> {
    match &manifest.multipart {
        None => match (manifest.content_length(), manifest.block_size()) {
            (Some(len), Some(size)) => (0..block_count(len, size))
                .map(|seq| BlockAddress {
                    version: manifest.id,
                    seq,
                })
                .collect(),
            _ => Vec::new(),
        },
        Some(Declared::Valid(mp)) => mp
            .parts
            .iter()
            .filter(|p| p.block_size > 0)
            .flat_map(|p| {
                (0..block_count(p.content_length, p.block_size)).map(move |seq| BlockAddress {
                    version: p.id,
                    seq,
                })
            })
            .collect(),
        Some(Declared::Invalid(_)) => Vec::new(),
    }
}
