//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::distributor::{RunEvent, RunReporter};
use crate::error::AppError;
use crate::models::{Job, Listing, Product, Record};
use crate::traits::{Extractor, Fetcher, ListingParser, ListingSource, PageParser};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Ok(html.to_string())])),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Err(error)])),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, AppError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockParser / MockListingParser
// ---------------------------------------------------------------------------

/// Mock page parser that returns a product with a fixed name.
#[derive(Clone)]
pub struct MockParser {
    name: String,
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockParser {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a parser whose first call returns an error.
    pub fn with_error(error: AppError) -> Self {
        Self {
            name: String::new(),
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl PageParser for MockParser {
    fn parse(&self, job: &Job, _html: &str) -> Result<Record, AppError> {
        let mut err = self.error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(make_test_product(&self.name, &job.url))
    }
}

/// Mock listing parser that returns the same entries for every page.
#[derive(Clone)]
pub struct MockListingParser {
    entries: Vec<Listing>,
}

impl MockListingParser {
    pub fn new(entries: Vec<Listing>) -> Self {
        Self { entries }
    }
}

impl ListingParser for MockListingParser {
    fn parse_listing(&self, _job: &Job, _html: &str) -> Result<Vec<Listing>, AppError> {
        Ok(self.entries.clone())
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Scripted behavior of [`MockExtractor`] for one URL.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Product(String),
    HttpStatus(u16),
    Transport(String),
    MissingData,
    Panic,
}

/// Mock extractor with per-URL scripting and concurrency instrumentation.
///
/// Unscripted URLs yield a product named after the job (or its last path
/// segment). Every call is recorded, along with start/end markers and the
/// peak number of concurrent calls.
#[derive(Clone, Default)]
pub struct MockExtractor {
    scripted: Arc<Mutex<HashMap<String, MockBehavior>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    default_delay: Duration,
    calls: Arc<Mutex<Vec<String>>>,
    timeline: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn delay_for(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn script(self, url: &str, behavior: MockBehavior) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
        self
    }

    /// URLs in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// `start:<url>` / `end:<url>` markers in the order they happened.
    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Extractor for MockExtractor {
    async fn extract(&self, job: &Job) -> Result<Record, AppError> {
        self.calls.lock().unwrap().push(job.url.clone());
        self.timeline
            .lock()
            .unwrap()
            .push(format!("start:{}", job.url));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&job.url)
            .copied()
            .unwrap_or(self.default_delay);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.timeline.lock().unwrap().push(format!("end:{}", job.url));

        let behavior = self.scripted.lock().unwrap().get(&job.url).cloned();
        match behavior {
            None => {
                let name = job
                    .name
                    .clone()
                    .unwrap_or_else(|| job.url.rsplit('/').next().unwrap_or("item").to_string());
                Ok(make_test_product(&name, &job.url))
            }
            Some(MockBehavior::Product(name)) => Ok(make_test_product(&name, &job.url)),
            Some(MockBehavior::HttpStatus(status)) => Err(AppError::HttpStatus {
                status,
                url: job.url.clone(),
            }),
            Some(MockBehavior::Transport(message)) => Err(AppError::Transport(message)),
            Some(MockBehavior::MissingData) => Err(AppError::MissingStructuredData(
                "structured data script not found".into(),
            )),
            Some(MockBehavior::Panic) => panic!("scripted panic for {}", job.url),
        }
    }
}

// ---------------------------------------------------------------------------
// MockListingSource
// ---------------------------------------------------------------------------

/// Mock listing source with per-URL entries; unscripted URLs fail with 404.
#[derive(Clone, Default)]
pub struct MockListingSource {
    pages: Arc<Mutex<HashMap<String, Vec<Listing>>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockListingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, entries: Vec<Listing>) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), entries);
        self
    }
}

impl ListingSource for MockListingSource {
    async fn list(&self, job: &Job) -> Result<Vec<Listing>, AppError> {
        self.calls.lock().unwrap().push(job.url.clone());
        tokio::task::yield_now().await;
        let entries = self.pages.lock().unwrap().get(&job.url).cloned();
        entries.ok_or_else(|| AppError::HttpStatus {
            status: 404,
            url: job.url.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock run reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunReporter for MockReporter {
    fn report(&self, event: RunEvent<'_>) {
        let label = match &event {
            RunEvent::RunStarted { .. } => "RunStarted",
            RunEvent::WindowStarted { .. } => "WindowStarted",
            RunEvent::WindowFinished { .. } => "WindowFinished",
            RunEvent::JobStarted { .. } => "JobStarted",
            RunEvent::JobSucceeded { .. } => "JobSucceeded",
            RunEvent::JobFailed { .. } => "JobFailed",
            RunEvent::PoolWorkerIdle { .. } => "PoolWorkerIdle",
            RunEvent::RunFinished { .. } => "RunFinished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a product record whose source is `url`.
pub fn make_test_product(name: &str, url: &str) -> Record {
    Record::Product(Product {
        name: name.to_string(),
        price: 1500.0,
        description: None,
        options: vec![],
        image_url: None,
        store_url: url.split('?').next().unwrap_or(url).to_string(),
        source_url: url.to_string(),
        category: None,
    })
}

/// Create a listing entry for `href`, optionally tagged with a category.
pub fn make_test_listing(href: &str, category: Option<&str>) -> Listing {
    Listing {
        href: href.to_string(),
        name: format!("Store {href}"),
        url: format!("https://example.com{href}"),
        delivery_time: Some("25 min".to_string()),
        delivery_price: None,
        rating: Some(4.5),
        category: category.map(str::to_string),
        category_index: None,
    }
}
