use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};

/// One unit of extraction work: a target URL plus optional metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Job {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            category: None,
            category_index: None,
            name: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_category_index(mut self, index: u32) -> Self {
        self.category_index = Some(index);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A topping / add-on offered with a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductOption {
    pub name: String,
    pub price: f64,
}

/// A single product scraped from its detail modal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ProductOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub store_url: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// One entry of a store menu, as published in the page's structured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub price: f64,
    pub product_url: String,
    pub store_url: String,
    pub category: String,
}

/// The full menu of one store page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMenu {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    pub store_url: String,
    pub source_url: String,
    pub items: Vec<MenuItem>,
}

/// A store as it appears on a category listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Identifier used for per-pass deduplication (the entry's `href`).
    pub href: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_index: Option<u32>,
}

impl Listing {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.href.trim().is_empty() {
            return Err(AppError::MissingStructuredData(
                "listing entry has no href".into(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::MissingStructuredData(format!(
                "listing entry {} has no name",
                self.href
            )));
        }
        Ok(())
    }
}

/// A successfully extracted entity, tagged by entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Product(Product),
    StoreMenu(StoreMenu),
}

impl Record {
    /// Display name of the extracted entity.
    pub fn name(&self) -> &str {
        match self {
            Record::Product(p) => &p.name,
            Record::StoreMenu(m) => m.store_name.as_deref().unwrap_or(&m.store_url),
        }
    }

    /// Check required fields before a record leaves the extractor boundary.
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Record::Product(p) => {
                if p.name.trim().is_empty() {
                    return Err(AppError::MissingStructuredData(
                        "product name is empty".into(),
                    ));
                }
                check_price(&p.name, p.price)?;
                for option in &p.options {
                    check_price(&option.name, option.price)?;
                }
                Ok(())
            }
            Record::StoreMenu(m) => {
                for item in &m.items {
                    if item.name.trim().is_empty() {
                        return Err(AppError::MissingStructuredData(format!(
                            "menu item without a name in {}",
                            m.store_url
                        )));
                    }
                    check_price(&item.name, item.price)?;
                }
                Ok(())
            }
        }
    }
}

fn check_price(name: &str, price: f64) -> Result<(), AppError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Decode(format!("invalid price {price} for '{name}'")));
    }
    Ok(())
}

/// A classified description of one failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub error_type: ErrorKind,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
}

impl ErrorRecord {
    pub fn from_error(job: &Job, error: &AppError) -> Self {
        Self {
            url: job.url.clone(),
            timestamp: Utc::now(),
            error_type: error.kind(),
            error_message: error.to_string(),
            status_code: error.status_code(),
            entity_name: job.name.clone(),
        }
    }

    /// Record for a fault the extractor failed to contain (panic, lost task).
    pub fn unexpected(job: &Job, message: impl Into<String>) -> Self {
        Self {
            url: job.url.clone(),
            timestamp: Utc::now(),
            error_type: ErrorKind::UnexpectedError,
            error_message: message.into(),
            status_code: None,
            entity_name: job.name.clone(),
        }
    }
}

/// Exactly one of these is produced per attempted job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Extracted(Record),
    Failed(ErrorRecord),
}

/// Results and errors of a run (or of one worker's share of it).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    pub results: Vec<Record>,
    pub errors: Vec<ErrorRecord>,
}

impl RunOutcome {
    pub fn push(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Extracted(record) => self.results.push(record),
            JobOutcome::Failed(error) => self.errors.push(error),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_parts(&self.results, &self.errors)
    }
}

impl FromIterator<JobOutcome> for RunOutcome {
    fn from_iter<I: IntoIterator<Item = JobOutcome>>(iter: I) -> Self {
        let mut outcome = RunOutcome::default();
        for item in iter {
            outcome.push(item);
        }
        outcome
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub results: usize,
    pub errors: usize,
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
}

impl RunSummary {
    pub fn from_parts(results: &[Record], errors: &[ErrorRecord]) -> Self {
        let mut errors_by_kind = BTreeMap::new();
        for error in errors {
            *errors_by_kind.entry(error.error_type).or_insert(0) += 1;
        }
        Self {
            results: results.len(),
            errors: errors.len(),
            errors_by_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, price: f64) -> Record {
        Record::Product(Product {
            name: name.into(),
            price,
            description: None,
            options: vec![],
            image_url: None,
            store_url: "https://example.com/store".into(),
            source_url: "https://example.com/store?productDetail=1".into(),
            category: None,
        })
    }

    #[test]
    fn test_record_is_tagged_by_kind() {
        let json = serde_json::to_value(product("Fugazzeta", 8500.0)).unwrap();
        assert_eq!(json["kind"], "product");
        assert_eq!(json["name"], "Fugazzeta");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_listing_entries_are_not_records() {
        let raw = r#"{"kind": "listing", "href": "/r/1", "name": "Pertutti", "url": "u"}"#;
        assert!(serde_json::from_str::<Record>(raw).is_err());

        let listing: Listing = serde_json::from_str(raw).unwrap();
        assert!(listing.validate().is_ok());
        assert!(listing.rating.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let err = product("  ", 10.0).validate().unwrap_err();
        assert!(matches!(err, AppError::MissingStructuredData(_)));
    }

    #[test]
    fn test_validate_rejects_bad_price() {
        assert!(matches!(
            product("Pizza", -1.0).validate().unwrap_err(),
            AppError::Decode(_)
        ));
        assert!(matches!(
            product("Pizza", f64::NAN).validate().unwrap_err(),
            AppError::Decode(_)
        ));
        assert!(product("Pizza", 0.0).validate().is_ok());
    }

    #[test]
    fn test_error_record_from_http_status() {
        let job = Job::new("https://example.com/p/3").with_name("Empanada");
        let record = ErrorRecord::from_error(
            &job,
            &AppError::HttpStatus {
                status: 404,
                url: job.url.clone(),
            },
        );
        assert_eq!(record.error_type, ErrorKind::HttpStatusError);
        assert_eq!(record.status_code, Some(404));
        assert_eq!(record.entity_name.as_deref(), Some("Empanada"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["error_type"], "http_status_error");
        assert_eq!(json["status_code"], 404);
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_error_record_omits_absent_optionals() {
        let record = ErrorRecord::from_error(&Job::new("https://x"), &AppError::Timeout(30));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("status_code").is_none());
        assert!(json.get("entity_name").is_none());
    }

    #[test]
    fn test_run_outcome_summary_groups_by_kind() {
        let job = Job::new("https://x");
        let outcome: RunOutcome = vec![
            JobOutcome::Extracted(product("A", 1.0)),
            JobOutcome::Failed(ErrorRecord::from_error(&job, &AppError::Timeout(1))),
            JobOutcome::Failed(ErrorRecord::from_error(
                &job,
                &AppError::Transport("reset".into()),
            )),
            JobOutcome::Failed(ErrorRecord::from_error(
                &job,
                &AppError::Decode("bad".into()),
            )),
        ]
        .into_iter()
        .collect();

        let summary = outcome.summary();
        assert_eq!(summary.results, 1);
        assert_eq!(summary.errors, 3);
        assert_eq!(summary.errors_by_kind[&ErrorKind::TransportError], 2);
        assert_eq!(summary.errors_by_kind[&ErrorKind::DecodeError], 1);
    }

    #[test]
    fn test_job_skips_absent_metadata() {
        let json = serde_json::to_string(&Job::new("https://x")).unwrap();
        assert_eq!(json, r#"{"url":"https://x"}"#);
    }
}
