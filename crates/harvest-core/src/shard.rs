//! Worker-private result shards.
//!
//! A shard is a pair of JSON arrays in the staging directory, named by the
//! worker index:
//!
//! ```text
//! shard-0000-results.json
//! shard-0000-errors.json
//! ```
//!
//! Each shard has exactly one writer, so no locking is involved. Both files
//! are written once, atomically, when the worker finishes.

use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::{JobOutcome, RunOutcome};
use crate::util::write_json_atomic;

const SHARD_PREFIX: &str = "shard-";
const RESULTS_SUFFIX: &str = "-results.json";
const ERRORS_SUFFIX: &str = "-errors.json";

/// Which half of a shard pair a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardPart {
    Results,
    Errors,
}

pub fn results_path(staging_dir: &Path, index: usize) -> PathBuf {
    staging_dir.join(format!("{SHARD_PREFIX}{index:04}{RESULTS_SUFFIX}"))
}

pub fn errors_path(staging_dir: &Path, index: usize) -> PathBuf {
    staging_dir.join(format!("{SHARD_PREFIX}{index:04}{ERRORS_SUFFIX}"))
}

/// Parse a shard file name back into its worker index and part.
///
/// Returns `None` for anything that is not a shard file.
pub fn parse_shard_name(file_name: &str) -> Option<(usize, ShardPart)> {
    let rest = file_name.strip_prefix(SHARD_PREFIX)?;
    let (index, part) = if let Some(index) = rest.strip_suffix(RESULTS_SUFFIX) {
        (index, ShardPart::Results)
    } else if let Some(index) = rest.strip_suffix(ERRORS_SUFFIX) {
        (index, ShardPart::Errors)
    } else {
        return None;
    };
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok().map(|i| (i, part))
}

/// Accumulates one worker's outcomes and writes them as a shard.
#[derive(Debug)]
pub struct ShardWriter {
    index: usize,
    staging_dir: PathBuf,
    outcome: RunOutcome,
}

impl ShardWriter {
    pub fn new(staging_dir: impl Into<PathBuf>, index: usize) -> Self {
        Self {
            index,
            staging_dir: staging_dir.into(),
            outcome: RunOutcome::default(),
        }
    }

    pub fn record(&mut self, outcome: JobOutcome) {
        self.outcome.push(outcome);
    }

    pub fn extend(&mut self, outcome: RunOutcome) {
        self.outcome.results.extend(outcome.results);
        self.outcome.errors.extend(outcome.errors);
    }

    /// Write both shard files and return their paths.
    ///
    /// The errors file is written first, so a worker killed in between leaves
    /// an incomplete pair that the aggregator refuses to merge.
    pub fn finish(self) -> Result<(PathBuf, PathBuf), AppError> {
        let results = results_path(&self.staging_dir, self.index);
        let errors = errors_path(&self.staging_dir, self.index);

        write_json_atomic(&errors, &self.outcome.errors)?;
        write_json_atomic(&results, &self.outcome.results)?;

        tracing::debug!(
            worker = self.index,
            results = self.outcome.results.len(),
            errors = self.outcome.errors.len(),
            "Shard written"
        );
        Ok((results, errors))
    }
}
