use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::models::Job;

/// One entry of a job file, in either accepted shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JobDescriptor {
    /// A product of a store, addressed through the store page's detail modal.
    StoreProduct {
        store_url: String,
        product_id: IdValue,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        category: Option<String>,
    },
    Target(Job),
}

/// Product ids show up both as numbers and as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for IdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdValue::Number(n) => write!(f, "{n}"),
            IdValue::Text(s) => f.write_str(s.trim()),
        }
    }
}

/// URL of a product's detail modal on its store page.
pub fn product_detail_url(store_url: &str, product_id: &str) -> String {
    format!("{store_url}?productDetail={product_id}")
}

/// Parse a job file's contents.
///
/// The document must be a JSON array. Entries that match neither accepted
/// shape (or carry an empty URL) are skipped with a warning.
pub fn parse_jobs(contents: &str) -> Result<Vec<Job>, AppError> {
    let entries: Vec<Value> = serde_json::from_str(contents)?;
    let mut jobs = Vec::with_capacity(entries.len());

    for (position, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<JobDescriptor>(entry) {
            Ok(JobDescriptor::StoreProduct {
                store_url,
                product_id,
                name,
                category,
            }) if !store_url.trim().is_empty() => {
                let mut job = Job::new(product_detail_url(
                    store_url.trim(),
                    &product_id.to_string(),
                ));
                job.name = name;
                job.category = category;
                jobs.push(job);
            }
            Ok(JobDescriptor::Target(job)) if !job.url.trim().is_empty() => jobs.push(job),
            Ok(_) | Err(_) => {
                tracing::warn!(position, "Skipping job entry without a usable target URL");
            }
        }
    }

    Ok(jobs)
}

/// Read and parse a job file. Unreadable or non-array files are fatal.
pub fn load_jobs(path: &Path) -> Result<Vec<Job>, AppError> {
    let contents = std::fs::read_to_string(path)?;
    let jobs = parse_jobs(&contents)?;
    tracing::info!(path = %path.display(), jobs = jobs.len(), "Loaded jobs");
    Ok(jobs)
}
