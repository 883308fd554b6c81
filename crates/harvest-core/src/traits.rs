use std::future::Future;

use crate::error::AppError;
use crate::models::{Job, Listing, Record};

/// Fetches the raw HTML of a page.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Turns the HTML of one job's page into a typed record.
pub trait PageParser: Send + Sync + Clone {
    fn parse(&self, job: &Job, html: &str) -> Result<Record, AppError>;
}

/// Turns the HTML of a category listing page into its entries, in page order.
///
/// Duplicates are returned as they appear; deduplication is the caller's job.
pub trait ListingParser: Send + Sync + Clone {
    fn parse_listing(&self, job: &Job, html: &str) -> Result<Vec<Listing>, AppError>;
}

/// Extracts one record for one job.
///
/// Implementations report failures as `Err`; the distributor converts them
/// into error records at the boundary, so an `Err` never stops a run.
pub trait Extractor: Send + Sync + Clone + 'static {
    fn extract(&self, job: &Job) -> impl Future<Output = Result<Record, AppError>> + Send;
}

/// Produces the entries of one listing page.
pub trait ListingSource: Send + Sync + Clone + 'static {
    fn list(&self, job: &Job) -> impl Future<Output = Result<Vec<Listing>, AppError>> + Send;
}
