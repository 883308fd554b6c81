use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::models::{ErrorRecord, Record, RunSummary};
use crate::shard::{ShardPart, errors_path, parse_shard_name, results_path};
use crate::util::write_json_atomic;

/// Merges worker shards into the canonical output and error log.
///
/// Runs after every worker has exited. All shards are read and validated
/// before anything is written, so a missing or corrupt shard aborts the
/// merge without touching the canonical artifacts.
#[derive(Debug, Clone)]
pub struct Aggregator {
    staging_dir: PathBuf,
    output: PathBuf,
    error_log: PathBuf,
    expected_workers: Option<usize>,
}

impl Aggregator {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        error_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            output: output.into(),
            error_log: error_log.into(),
            expected_workers: None,
        }
    }

    /// Require shards `0..workers` to be present.
    pub fn with_expected_workers(mut self, workers: usize) -> Self {
        self.expected_workers = Some(workers);
        self
    }

    /// Worker indices with a complete shard pair, in ascending order.
    pub fn discover(&self) -> Result<Vec<usize>, AppError> {
        let mut pairs: BTreeMap<usize, (bool, bool)> = BTreeMap::new();
        match fs::read_dir(&self.staging_dir) {
            Ok(entries) => {
                for entry in entries {
                    let name = entry?.file_name();
                    let Some((index, part)) = name.to_str().and_then(parse_shard_name) else {
                        continue;
                    };
                    let pair = pairs.entry(index).or_default();
                    match part {
                        ShardPart::Results => pair.0 = true,
                        ShardPart::Errors => pair.1 = true,
                    }
                }
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        for (&index, &(has_results, has_errors)) in &pairs {
            if !has_results {
                return Err(self.missing(results_path(&self.staging_dir, index)));
            }
            if !has_errors {
                return Err(self.missing(errors_path(&self.staging_dir, index)));
            }
        }

        if let Some(workers) = self.expected_workers {
            if let Some(absent) = (0..workers).find(|i| !pairs.contains_key(i)) {
                return Err(self.missing(results_path(&self.staging_dir, absent)));
            }
        }

        Ok(pairs.into_keys().collect())
    }

    /// Merge every shard in worker-index order, replace the canonical
    /// artifacts, then delete the shards.
    ///
    /// With no shards present this is a no-op: the canonical artifacts are
    /// left as they are and an empty summary is returned.
    pub fn merge(&self) -> Result<RunSummary, AppError> {
        let indices = self.discover()?;
        if indices.is_empty() {
            tracing::info!(staging_dir = %self.staging_dir.display(), "No shards to merge");
            return Ok(RunSummary::default());
        }

        let mut results: Vec<Record> = Vec::new();
        let mut errors: Vec<ErrorRecord> = Vec::new();
        for &index in &indices {
            results.extend(read_shard::<Record>(&results_path(&self.staging_dir, index))?);
            errors.extend(read_shard::<ErrorRecord>(&errors_path(
                &self.staging_dir,
                index,
            ))?);
        }

        write_json_atomic(&self.output, &results)?;
        write_json_atomic(&self.error_log, &errors)?;

        for &index in &indices {
            for path in [
                results_path(&self.staging_dir, index),
                errors_path(&self.staging_dir, index),
            ] {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to delete merged shard"
                    );
                }
            }
        }
        // Only succeeds once the directory is empty.
        let _ = fs::remove_dir(&self.staging_dir);

        let summary = RunSummary::from_parts(&results, &errors);
        tracing::info!(
            shards = indices.len(),
            results = summary.results,
            errors = summary.errors,
            output = %self.output.display(),
            "Shards merged"
        );
        Ok(summary)
    }

    fn missing(&self, path: PathBuf) -> AppError {
        AppError::ShardMissing(path.display().to_string())
    }
}

fn read_shard<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, AppError> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        IoErrorKind::NotFound => AppError::ShardMissing(path.display().to_string()),
        _ => AppError::ShardCorrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        },
    })?;
    serde_json::from_str(&contents).map_err(|e| AppError::ShardCorrupt {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
