use crate::error::AppError;
use crate::models::{Job, Listing, Record};
use crate::traits::{Extractor, Fetcher, ListingParser, ListingSource, PageParser};

/// Extractor that fetches a job's page and hands the HTML to a parser.
///
/// Generic over the fetcher and parser so the same pipeline serves product
/// modals and store menus, over plain HTTP or a headless browser.
#[derive(Clone)]
pub struct PageExtractor<F, P>
where
    F: Fetcher,
    P: PageParser,
{
    fetcher: F,
    parser: P,
}

impl<F, P> PageExtractor<F, P>
where
    F: Fetcher,
    P: PageParser,
{
    pub fn new(fetcher: F, parser: P) -> Self {
        Self { fetcher, parser }
    }
}

impl<F, P> Extractor for PageExtractor<F, P>
where
    F: Fetcher + 'static,
    P: PageParser + 'static,
{
    async fn extract(&self, job: &Job) -> Result<Record, AppError> {
        let html = self.fetcher.fetch(&job.url).await?;
        tracing::debug!(url = %job.url, bytes = html.len(), "Fetched page");

        let record = self.parser.parse(job, &html)?;
        tracing::debug!(url = %job.url, name = %record.name(), "Parsed record");
        Ok(record)
    }
}

/// Listing source that fetches a category page and parses its entries.
#[derive(Clone)]
pub struct PageListingSource<F, P>
where
    F: Fetcher,
    P: ListingParser,
{
    fetcher: F,
    parser: P,
}

impl<F, P> PageListingSource<F, P>
where
    F: Fetcher,
    P: ListingParser,
{
    pub fn new(fetcher: F, parser: P) -> Self {
        Self { fetcher, parser }
    }
}

impl<F, P> ListingSource for PageListingSource<F, P>
where
    F: Fetcher + 'static,
    P: ListingParser + 'static,
{
    async fn list(&self, job: &Job) -> Result<Vec<Listing>, AppError> {
        let html = self.fetcher.fetch(&job.url).await?;
        let entries = self.parser.parse_listing(job, &html)?;
        tracing::debug!(url = %job.url, entries = entries.len(), "Parsed listing page");
        Ok(entries)
    }
}
