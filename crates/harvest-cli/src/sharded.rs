//! Process-isolated extraction: one child `harvest worker` per job chunk,
//! each writing its own shard, merged once every child has exited.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::{Context, Result, bail};
use futures::future::join_all;
use tokio::process::Command;

use harvest_core::models::{Job, RunOutcome, RunSummary};
use harvest_core::util::{read_json_array, write_json_atomic};
use harvest_core::{Aggregator, ShardWriter, partition_chunks};

use crate::pipeline::{self, ExtractionArgs};

fn chunk_path(staging_dir: &Path, index: usize) -> PathBuf {
    staging_dir.join(format!("chunk-{index:04}.json"))
}

/// Split `jobs` across `workers` child processes and merge their shards into
/// `output` and `error_log`.
pub async fn run(
    jobs: Vec<Job>,
    workers: usize,
    staging_dir: &Path,
    output: &Path,
    error_log: &Path,
    extraction: &ExtractionArgs,
) -> Result<RunSummary> {
    let chunks = partition_chunks(&jobs, workers)?;
    let aggregator = Aggregator::new(staging_dir, output, error_log);

    let leftovers = aggregator.discover()?;
    if !leftovers.is_empty() {
        bail!(
            "{} holds {} unmerged shard(s) from an earlier run; run `harvest merge` first",
            staging_dir.display(),
            leftovers.len()
        );
    }

    if chunks.is_empty() {
        let outcome = RunOutcome::default();
        write_json_atomic(output, &outcome.results)?;
        write_json_atomic(error_log, &outcome.errors)?;
        return Ok(outcome.summary());
    }

    std::fs::create_dir_all(staging_dir)
        .with_context(|| format!("Failed to create staging dir {}", staging_dir.display()))?;

    let exe = std::env::current_exe().context("Failed to locate the harvest executable")?;
    let mut children = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        let path = chunk_path(staging_dir, index);
        write_json_atomic(&path, chunk)?;

        let child = Command::new(&exe)
            .arg("worker")
            .arg("--chunk")
            .arg(&path)
            .arg("--index")
            .arg(index.to_string())
            .arg("--staging-dir")
            .arg(staging_dir)
            .args(extraction.to_args())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn worker {index}"))?;
        tracing::info!(worker = index, jobs = chunk.len(), "Worker started");
        children.push(child);
    }

    let statuses: Vec<std::io::Result<ExitStatus>> =
        join_all(children.iter_mut().map(|child| child.wait())).await;

    for (index, status) in statuses.iter().enumerate() {
        match status {
            Ok(status) if status.success() => {
                tracing::debug!(worker = index, "Worker finished");
            }
            Ok(status) => tracing::error!(worker = index, %status, "Worker failed"),
            Err(e) => tracing::error!(worker = index, error = %e, "Failed to wait for worker"),
        }
        let path = chunk_path(staging_dir, index);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete chunk file");
        }
    }

    let summary = aggregator
        .with_expected_workers(chunks.len())
        .merge()
        .context("Failed to merge worker shards")?;
    Ok(summary)
}

/// Body of a `harvest worker` child: extract one chunk and write its shard.
pub async fn work(
    chunk: &Path,
    index: usize,
    staging_dir: &Path,
    extraction: &ExtractionArgs,
) -> Result<()> {
    let jobs: Vec<Job> = read_json_array(chunk)
        .with_context(|| format!("Failed to read chunk {}", chunk.display()))?;
    tracing::info!(worker = index, jobs = jobs.len(), "Worker extracting chunk");

    let outcome = pipeline::extract(
        jobs,
        extraction.page,
        &extraction.run_config(),
        &extraction.fetch,
    )
    .await?;

    let mut shard = ShardWriter::new(staging_dir, index);
    shard.extend(outcome);
    shard.finish().context("Failed to write shard")?;
    Ok(())
}
