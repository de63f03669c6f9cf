//! Job configuration, loaded from TOML or JSON.

use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 1 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 1_048_576;
/// 5 MiB.
pub const DEFAULT_MAX_BLOCK_SIZE: u64 = 5 * 1_048_576;
/// 5 TiB.
pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 5 * 1024 * 1024 * 1024 * 1024;
/// One day.
pub const DEFAULT_LEEWAY_SECS: u64 = 86_400;

/// Configuration for manifest creation and usage jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Block size for newly created manifests.
    pub block_size: u64,
    /// Upper bound for any block size.
    pub max_block_size: u64,
    /// Largest object a manifest may describe.
    pub max_content_length: u64,
    /// Age, in seconds, separating "new" from "old" records when `div_point` is unset.
    pub leeway_secs: u64,
    /// Explicit cutoff between "new" and "old" records.
    pub div_point: Option<DateTime<Utc>>,
    /// Number of input batches the local job maps and reduces independently.
    pub partitions: usize,
    /// Shuffle map inputs before batching.
    pub shuffle_inputs: bool,
    /// Seed for the input shuffle; random when unset.
    pub shuffle_seed: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            leeway_secs: DEFAULT_LEEWAY_SECS,
            div_point: None,
            partitions: 4,
            shuffle_inputs: false,
            shuffle_seed: None,
        }
    }
}

impl LedgerConfig {
    /// Loads a configuration file, picking the format from its extension.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: LedgerConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                return Err(LedgerError::InvalidConfig {
                    reason: format!("unsupported config file extension: {:?}", ext),
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values are usable together.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.block_size == 0 {
            return Err(invalid("block_size must be positive"));
        }
        if self.block_size > self.max_block_size {
            return Err(invalid(format!(
                "block_size {} exceeds max_block_size {}",
                self.block_size, self.max_block_size
            )));
        }
        if self.partitions == 0 {
            return Err(invalid("partitions must be positive"));
        }
        Ok(())
    }

    /// Block size for new manifests, clamped to the ceiling.
    pub fn block_size(&self) -> u64 {
        self.block_size.min(self.max_block_size)
    }

    /// The "new"/"old" cutoff relative to `now`.
    pub fn div_point_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.div_point.unwrap_or_else(|| {
            let leeway = i64::try_from(self.leeway_secs).unwrap_or(i64::MAX);
            now.checked_sub_signed(Duration::seconds(leeway.min(i64::MAX / 1000)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }

    /// The "new"/"old" cutoff relative to the current time.
    pub fn div_point(&self) -> DateTime<Utc> {
        self.div_point_at(Utc::now())
    }
}

fn invalid(reason: impl Into<String>) -> LedgerError {
    LedgerError::InvalidConfig {
        reason: reason.into(),
    }
}
