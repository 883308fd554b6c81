pub mod aggregate;
pub mod config;
pub mod distributor;
pub mod error;
pub mod job_source;
pub mod listing;
pub mod models;
pub mod scrape;
pub mod shard;
pub mod store;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use aggregate::Aggregator;
pub use config::{AdmissionPolicy, FieldSet, PolicyKind, RunConfig};
pub use distributor::{
    Distributor, RunEvent, RunReporter, TracingRunReporter, guarded_extract, partition_chunks,
};
pub use error::{AppError, ErrorKind};
pub use job_source::{load_jobs, parse_jobs, product_detail_url};
pub use listing::{CollectionReport, DedupSet, ListingCollector, PassStats};
pub use models::{
    ErrorRecord, Job, JobOutcome, Listing, MenuItem, Product, ProductOption, Record, RunOutcome,
    RunSummary, StoreMenu,
};
pub use scrape::{PageExtractor, PageListingSource};
pub use shard::ShardWriter;
pub use store::SharedAppendStore;
pub use traits::{Extractor, Fetcher, ListingParser, ListingSource, PageParser};
