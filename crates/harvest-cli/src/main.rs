mod pipeline;
mod sharded;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use harvest_core::load_jobs;
use harvest_core::models::Job;
use harvest_core::util::{derive_error_log_path, derive_output_path, write_json_atomic};
use harvest_core::{Aggregator, RunConfig};

use pipeline::{AdmissionArgs, ExtractionArgs, FetchArgs, FieldArgs};

#[derive(Parser)]
#[command(name = "harvest", version, about = "Concurrent storefront catalog extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every job in one process and write the output and error log
    Extract {
        /// JSON array of jobs (`{"url": ...}` or store/product descriptors)
        #[arg(short, long)]
        jobs: PathBuf,

        /// Output file (defaults to `scraped_<jobs file>` next to the jobs file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Error log (defaults to `errors_<jobs file>` next to the jobs file)
        #[arg(short, long)]
        errors: Option<PathBuf>,

        #[command(flatten)]
        extraction: ExtractionArgs,
    },

    /// Split the jobs across worker processes and merge their shards
    ShardRun {
        /// JSON array of jobs
        #[arg(short, long)]
        jobs: PathBuf,

        /// Number of worker processes
        #[arg(short, long, env = "HARVEST_WORKERS", default_value_t = 4)]
        workers: usize,

        /// Directory for chunk files and worker shards
        /// (defaults to `<output>.shards` next to the output)
        #[arg(long, env = "HARVEST_STAGING_DIR")]
        staging_dir: Option<PathBuf>,

        /// Output file (defaults to `scraped_<jobs file>` next to the jobs file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Error log (defaults to `errors_<jobs file>` next to the jobs file)
        #[arg(short, long)]
        errors: Option<PathBuf>,

        #[command(flatten)]
        extraction: ExtractionArgs,
    },

    /// Extract one chunk and write its shard (spawned by `shard-run`)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        chunk: PathBuf,

        #[arg(long)]
        index: usize,

        #[arg(long)]
        staging_dir: PathBuf,

        #[command(flatten)]
        extraction: ExtractionArgs,
    },

    /// Merge the shards left in a staging directory
    Merge {
        /// Directory holding `shard-NNNN-*.json` files
        #[arg(long, env = "HARVEST_STAGING_DIR")]
        staging_dir: PathBuf,

        /// Output file to replace
        #[arg(short, long)]
        output: PathBuf,

        /// Error log to replace
        #[arg(short, long)]
        errors: PathBuf,

        /// Fail unless shards 0..N are all present
        #[arg(long)]
        expected_workers: Option<usize>,
    },

    /// Collect store listings per category into a shared, deduplicated file
    Listing {
        /// JSON array of category jobs (`{"url", "category", "category_index"}`)
        #[arg(short, long)]
        jobs: PathBuf,

        /// Shared listing file entries are appended to
        #[arg(short, long)]
        output: PathBuf,

        /// Error log (defaults to `errors_<jobs file>` next to the jobs file)
        #[arg(short, long)]
        errors: Option<PathBuf>,

        /// Seconds an append may wait for the store lock
        #[arg(long, env = "HARVEST_LOCK_TIMEOUT_SECS", default_value_t = 30)]
        lock_timeout_secs: u64,

        #[command(flatten)]
        admission: AdmissionArgs,

        #[command(flatten)]
        fetch: FetchArgs,

        #[command(flatten)]
        fields: FieldArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("harvest=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            jobs,
            output,
            errors,
            extraction,
        } => {
            let output = output.unwrap_or_else(|| derive_output_path(&jobs));
            let errors = errors.unwrap_or_else(|| derive_error_log_path(&jobs));
            cmd_extract(&jobs, &output, &errors, &extraction).await?;
        }
        Commands::ShardRun {
            jobs,
            workers,
            staging_dir,
            output,
            errors,
            extraction,
        } => {
            let output = output.unwrap_or_else(|| derive_output_path(&jobs));
            let errors = errors.unwrap_or_else(|| derive_error_log_path(&jobs));
            let staging_dir = staging_dir.unwrap_or_else(|| default_staging_dir(&output));
            cmd_shard_run(&jobs, workers, &staging_dir, &output, &errors, &extraction).await?;
        }
        Commands::Worker {
            chunk,
            index,
            staging_dir,
            extraction,
        } => {
            sharded::work(&chunk, index, &staging_dir, &extraction).await?;
        }
        Commands::Merge {
            staging_dir,
            output,
            errors,
            expected_workers,
        } => {
            cmd_merge(&staging_dir, &output, &errors, expected_workers)?;
        }
        Commands::Listing {
            jobs,
            output,
            errors,
            lock_timeout_secs,
            admission,
            fetch,
            fields,
        } => {
            let errors = errors.unwrap_or_else(|| derive_error_log_path(&jobs));
            let config = RunConfig::default()
                .with_policy(admission.policy())
                .with_fields(fields.field_set())
                .with_lock_timeout(Duration::from_secs(lock_timeout_secs));
            cmd_listing(&jobs, &output, &errors, &config, &fetch).await?;
        }
    }

    Ok(())
}

/// `<output>.shards` next to the output file.
fn default_staging_dir(output: &Path) -> PathBuf {
    let file_name = output
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("harvest");
    output.with_file_name(format!("{file_name}.shards"))
}

fn read_jobs(path: &Path) -> Result<Vec<Job>> {
    load_jobs(path).with_context(|| format!("Failed to load jobs from {}", path.display()))
}

async fn cmd_extract(
    jobs_path: &Path,
    output: &Path,
    errors: &Path,
    extraction: &ExtractionArgs,
) -> Result<()> {
    let jobs = read_jobs(jobs_path)?;

    let outcome = pipeline::extract(
        jobs,
        extraction.page,
        &extraction.run_config(),
        &extraction.fetch,
    )
    .await?;

    write_json_atomic(output, &outcome.results)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    write_json_atomic(errors, &outcome.errors)
        .with_context(|| format!("Failed to write {}", errors.display()))?;

    let summary = outcome.summary();
    tracing::info!(
        results = summary.results,
        errors = summary.errors,
        output = %output.display(),
        error_log = %errors.display(),
        "Extraction complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_shard_run(
    jobs_path: &Path,
    workers: usize,
    staging_dir: &Path,
    output: &Path,
    errors: &Path,
    extraction: &ExtractionArgs,
) -> Result<()> {
    let jobs = read_jobs(jobs_path)?;
    let summary = sharded::run(jobs, workers, staging_dir, output, errors, extraction).await?;

    tracing::info!(
        results = summary.results,
        errors = summary.errors,
        output = %output.display(),
        "Sharded extraction complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_merge(
    staging_dir: &Path,
    output: &Path,
    errors: &Path,
    expected_workers: Option<usize>,
) -> Result<()> {
    let mut aggregator = Aggregator::new(staging_dir, output, errors);
    if let Some(workers) = expected_workers {
        aggregator = aggregator.with_expected_workers(workers);
    }
    let summary = aggregator.merge().context("Failed to merge shards")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_listing(
    jobs_path: &Path,
    output: &Path,
    errors: &Path,
    config: &RunConfig,
    fetch: &FetchArgs,
) -> Result<()> {
    let jobs = read_jobs(jobs_path)?;
    let report = pipeline::collect_listings(jobs, output, config, fetch).await?;

    write_json_atomic(errors, &report.errors)
        .with_context(|| format!("Failed to write {}", errors.display()))?;

    tracing::info!(
        appended = report.stats.appended,
        duplicates = report.stats.duplicates,
        failed_pages = report.errors.len(),
        store = %output.display(),
        "Listing collection complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
