use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::error::AppError;

/// Derive the default output path for a job file.
///
/// The output lands next to the job file, prefixed with `scraped_`.
/// Example: `"output/pizza.json"` → `"output/scraped_pizza.json"`
pub fn derive_output_path(jobs_path: &Path) -> PathBuf {
    sibling_with_prefix(jobs_path, "scraped_")
}

/// Derive the default error log path for a job file.
///
/// Example: `"output/pizza.json"` → `"output/errors_pizza.json"`
pub fn derive_error_log_path(jobs_path: &Path) -> PathBuf {
    sibling_with_prefix(jobs_path, "errors_")
}

fn sibling_with_prefix(path: &Path, prefix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("jobs.json");
    path.with_file_name(format!("{prefix}{file_name}"))
}

/// Serialize `value` as indented JSON and atomically replace `path` with it.
///
/// The document is written to a temporary file in the same directory, synced,
/// then renamed over the target, so readers see either the old or the new
/// content in full.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| AppError::Io(e.error))?;
    Ok(())
}

/// Read a JSON array document.
pub fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, AppError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
