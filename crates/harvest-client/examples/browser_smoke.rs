/// Smoke test for `BrowserFetcher` against a live product modal.
///
/// Run with:
///   cargo run -p harvest-client --example browser_smoke --features browser -- <product-url>
use harvest_client::{BrowserFetcher, PRODUCT_MODAL_SELECTOR, ProductParser};
use harvest_core::config::FieldSet;
use harvest_core::models::Job;
use harvest_core::traits::{Fetcher, PageParser};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let url = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: browser_smoke <product-url>"))?;

    let fetcher = BrowserFetcher::new().await?.wait_for(PRODUCT_MODAL_SELECTOR);
    let html = fetcher.fetch(&url).await?;
    println!("Rendered {} bytes", html.len());

    let record = ProductParser::new(FieldSet::default())?.parse(&Job::new(&url), &html)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
