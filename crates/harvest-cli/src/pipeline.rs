use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use harvest_client::{
    DEFAULT_USER_AGENT, LISTING_ENTRY_SELECTOR, MenuParser, PRODUCT_MODAL_SELECTOR, ProductParser,
    ReqwestFetcher, StoreListingParser,
};
use harvest_core::models::{Job, Listing, RunOutcome};
use harvest_core::traits::Fetcher;
use harvest_core::{
    AdmissionPolicy, CollectionReport, Distributor, FieldSet, ListingCollector, PageExtractor,
    PageListingSource, PolicyKind, RunConfig, SharedAppendStore, TracingRunReporter,
};

/// Page type the jobs point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PageKind {
    /// A store page opened on a product detail modal
    Product,
    /// A store page whose full menu is read from its structured data
    Menu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetcherKind {
    /// Plain HTTP requests
    Http,
    /// Headless Chromium (requires the `browser` feature)
    Browser,
}

#[derive(Args, Debug, Clone)]
pub struct AdmissionArgs {
    /// Admission policy: "pool" (continuous) or "window" (barrier per window)
    #[arg(long, default_value = "pool")]
    pub policy: PolicyKind,

    /// Pool size or window size
    #[arg(short, long, env = "HARVEST_CONCURRENCY", default_value_t = 5)]
    pub concurrency: usize,
}

impl AdmissionArgs {
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy.with_size(self.concurrency)
    }

    fn to_args(&self) -> Vec<String> {
        let policy = match self.policy {
            PolicyKind::Pool => "pool",
            PolicyKind::Window => "window",
        };
        vec![
            "--policy".into(),
            policy.into(),
            "--concurrency".into(),
            self.concurrency.to_string(),
        ]
    }
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// How pages are fetched
    #[arg(long, value_enum, default_value_t = FetcherKind::Http)]
    pub fetcher: FetcherKind,

    /// Per-page fetch timeout in seconds
    #[arg(long, env = "HARVEST_FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// User-Agent header for HTTP fetches
    #[arg(long, env = "HARVEST_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl FetchArgs {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn to_args(&self) -> Vec<String> {
        let fetcher = match self.fetcher {
            FetcherKind::Http => "http",
            FetcherKind::Browser => "browser",
        };
        vec![
            "--fetcher".into(),
            fetcher.into(),
            "--fetch-timeout-secs".into(),
            self.fetch_timeout_secs.to_string(),
            "--user-agent".into(),
            self.user_agent.clone(),
        ]
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    /// Skip product and menu item descriptions
    #[arg(long)]
    pub no_descriptions: bool,

    /// Skip product images
    #[arg(long)]
    pub no_images: bool,

    /// Skip product toppings/options
    #[arg(long)]
    pub no_options: bool,

    /// Skip listing ratings
    #[arg(long)]
    pub no_ratings: bool,
}

impl FieldArgs {
    pub fn field_set(&self) -> FieldSet {
        FieldSet {
            descriptions: !self.no_descriptions,
            images: !self.no_images,
            options: !self.no_options,
            ratings: !self.no_ratings,
        }
    }

    fn to_args(&self) -> Vec<String> {
        [
            (self.no_descriptions, "--no-descriptions"),
            (self.no_images, "--no-images"),
            (self.no_options, "--no-options"),
            (self.no_ratings, "--no-ratings"),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .map(|(_, flag)| flag.to_string())
        .collect()
    }
}

/// Everything needed to extract a list of jobs, shared by the cooperative
/// run, the process-sharded run and its workers.
#[derive(Args, Debug, Clone)]
pub struct ExtractionArgs {
    /// Page type the jobs point at
    #[arg(long, value_enum, default_value_t = PageKind::Product)]
    pub page: PageKind,

    #[command(flatten)]
    pub admission: AdmissionArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,

    #[command(flatten)]
    pub fields: FieldArgs,
}

impl ExtractionArgs {
    pub fn run_config(&self) -> RunConfig {
        RunConfig::default()
            .with_policy(self.admission.policy())
            .with_fields(self.fields.field_set())
    }

    /// Re-encode as command-line arguments for a worker process.
    pub fn to_args(&self) -> Vec<String> {
        let page = match self.page {
            PageKind::Product => "product",
            PageKind::Menu => "menu",
        };
        let mut args = vec!["--page".to_string(), page.to_string()];
        args.extend(self.admission.to_args());
        args.extend(self.fetch.to_args());
        args.extend(self.fields.to_args());
        args
    }
}

/// Extract every job once under the configured admission policy.
pub async fn extract(
    jobs: Vec<Job>,
    page: PageKind,
    config: &RunConfig,
    fetch: &FetchArgs,
) -> Result<RunOutcome> {
    let distributor = Distributor::new(config.policy)?;
    tracing::info!(jobs = jobs.len(), policy = %config.policy, ?page, "Starting extraction");

    match fetch.fetcher {
        FetcherKind::Http => {
            let fetcher = ReqwestFetcher::with_options(fetch.timeout(), &fetch.user_agent)
                .context("Failed to create HTTP client")?;
            extract_with(fetcher, jobs, page, config.fields, distributor).await
        }
        FetcherKind::Browser => {
            let wait_for = match page {
                PageKind::Product => PRODUCT_MODAL_SELECTOR,
                PageKind::Menu => "body",
            };
            let fetcher = browser_fetcher(fetch.timeout(), wait_for).await?;
            extract_with(fetcher, jobs, page, config.fields, distributor).await
        }
    }
}

async fn extract_with<F>(
    fetcher: F,
    jobs: Vec<Job>,
    page: PageKind,
    fields: FieldSet,
    distributor: Distributor,
) -> Result<RunOutcome>
where
    F: Fetcher + 'static,
{
    let reporter = Arc::new(TracingRunReporter);

    let outcome = match page {
        PageKind::Product => {
            let extractor = PageExtractor::new(fetcher, ProductParser::new(fields)?);
            distributor.run(jobs, extractor, reporter).await
        }
        PageKind::Menu => {
            let extractor = PageExtractor::new(fetcher, MenuParser::new(fields)?);
            distributor.run(jobs, extractor, reporter).await
        }
    };
    Ok(outcome)
}

/// Run one listing pass per category job, appending into `output`.
pub async fn collect_listings(
    jobs: Vec<Job>,
    output: &Path,
    config: &RunConfig,
    fetch: &FetchArgs,
) -> Result<CollectionReport> {
    let distributor = Distributor::new(config.policy)?;
    let store = SharedAppendStore::<Listing>::new(output).with_lock_timeout(config.lock_timeout);
    let parser = StoreListingParser::new(config.fields)?;
    let reporter = Arc::new(TracingRunReporter);
    tracing::info!(
        categories = jobs.len(),
        policy = %config.policy,
        store = %output.display(),
        "Starting listing collection"
    );

    let report = match fetch.fetcher {
        FetcherKind::Http => {
            let fetcher = ReqwestFetcher::with_options(fetch.timeout(), &fetch.user_agent)
                .context("Failed to create HTTP client")?;
            ListingCollector::new(PageListingSource::new(fetcher, parser), store, distributor)
                .collect(jobs, reporter)
                .await?
        }
        FetcherKind::Browser => {
            let fetcher = browser_fetcher(fetch.timeout(), LISTING_ENTRY_SELECTOR).await?;
            ListingCollector::new(PageListingSource::new(fetcher, parser), store, distributor)
                .collect(jobs, reporter)
                .await?
        }
    };
    Ok(report)
}

#[cfg(feature = "browser")]
async fn browser_fetcher(
    timeout: Duration,
    wait_for: &str,
) -> Result<harvest_client::BrowserFetcher> {
    let fetcher = harvest_client::BrowserFetcher::with_timeout(timeout)
        .await
        .context("Failed to launch headless browser")?;
    Ok(fetcher.wait_for(wait_for))
}

#[cfg(not(feature = "browser"))]
async fn browser_fetcher(_timeout: Duration, _wait_for: &str) -> Result<ReqwestFetcher> {
    anyhow::bail!("browser fetching needs a build with `--features browser`")
}
