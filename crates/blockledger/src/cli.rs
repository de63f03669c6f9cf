//! Command-line interface for running usage jobs over exported histories.

use crate::block::{block_count, initial_blocks};
use crate::config::LedgerConfig;
use crate::job::{JobInput, LocalJob};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Top-level arguments.
#[derive(Parser, Debug)]
#[command(name = "blockledger")]
#[command(about = "Block tracking and usage accounting for versioned object storage", long_about = None)]
pub struct Cli {
    /// Configuration file (.toml or .json).
    #[arg(short, long, env = "BLOCKLEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Per-bucket object, byte and block totals.
    Usage {
        /// JSON array of `{ "key": .., "value": history | null }`.
        #[arg(short, long)]
        input: PathBuf,
        /// Cutoff between "new" and "old" records (RFC 3339).
        #[arg(long)]
        div_point: Option<DateTime<Utc>>,
    },
    /// Visible object and byte totals.
    Sizes {
        /// JSON array of `{ "key": .., "value": history | null }`.
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Block layout of an object of the given length.
    Blocks {
        /// Content length in bytes.
        #[arg(short, long)]
        length: u64,
        /// Block size; defaults to the configured one.
        #[arg(short, long)]
        block_size: Option<u64>,
        /// Also print every block id.
        #[arg(long)]
        list: bool,
    },
}

impl Cli {
    /// Runs the selected subcommand, printing JSON to stdout.
    pub async fn run(self) -> Result<()> {
        let mut config = self.load_config()?;
        match self.command {
            Command::Usage { input, div_point } => {
                if div_point.is_some() {
                    config.div_point = div_point;
                }
                let job = LocalJob::from_config(&config)?;
                let tally = job.bucket_summary(read_inputs(&input)?).await?;
                let out = json!({
                    "div_point": job.aggregator().div_point(),
                    "buckets": tally.rows(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            Command::Sizes { input } => {
                let job = LocalJob::from_config(&config)?;
                let sizes = job.object_sizes(read_inputs(&input)?).await?;
                let out = json!({ "objects": sizes.count, "bytes": sizes.bytes });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            Command::Blocks {
                length,
                block_size,
                list,
            } => {
                let size = block_size.unwrap_or_else(|| config.block_size());
                if size == 0 {
                    anyhow::bail!("block size must be positive");
                }
                if size > config.max_block_size {
                    tracing::warn!(
                        block_size = size,
                        max = config.max_block_size,
                        "Block size exceeds configured maximum"
                    );
                }
                let mut out = json!({
                    "length": length,
                    "block_size": size,
                    "count": block_count(length, size),
                });
                if list {
                    out["blocks"] = json!(initial_blocks(length, size));
                }
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
        Ok(())
    }

    fn load_config(&self) -> Result<LedgerConfig> {
        match &self.config {
            Some(path) => LedgerConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display())),
            None => Ok(LedgerConfig::default()),
        }
    }
}

/// Reads job inputs from a JSON file.
pub fn read_inputs(path: &Path) -> Result<Vec<JobInput>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading input {}", path.display()))?;
    let inputs: Vec<JobInput> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing input {}", path.display()))?;
    tracing::debug!(objects = inputs.len(), "Loaded job inputs");
    Ok(inputs)
}
