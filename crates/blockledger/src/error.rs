//! Error types for the ledger.
//!
//! Classification and aggregation never fail; these errors only surface where the
//! crate touches foreign bytes, configuration, or the job executor.

use thiserror::Error;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error variants for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A block name could not be decoded back into its components.
    #[error("Block name decode failed: {reason}")]
    BlockNameDecode {
        /// Description of the decode failure.
        reason: String,
    },

    /// A block name could not be encoded.
    #[error("Block name encode failed: {reason}")]
    BlockNameEncode {
        /// Why the name has no valid encoding.
        reason: String,
    },

    /// Configuration is inconsistent or out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },

    /// Object is larger than the configured maximum content length.
    #[error("Content too large: {length} bytes exceeds maximum of {max}")]
    ContentTooLarge {
        /// The declared content length.
        length: u64,
        /// The configured maximum.
        max: u64,
    },

    /// A map or reduce task of the local job executor failed.
    #[error("Job error: {reason}")]
    Job {
        /// Description of the failure.
        reason: String,
    },

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
