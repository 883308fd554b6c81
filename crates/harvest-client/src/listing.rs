use std::sync::Arc;

use harvest_core::config::FieldSet;
use harvest_core::error::AppError;
use harvest_core::models::{Job, Listing};
use harvest_core::traits::ListingParser;
use scraper::{Html, Selector};
use url::Url;

use crate::html::{element_text, first_text, selector};

/// Selector a store card on a listing page is recognized by.
pub const LISTING_ENTRY_SELECTOR: &str = r#"a[data-qa^="store-item-restaurant"]"#;

struct ListingSelectors {
    entry: Selector,
    name: Selector,
    delivery_cost: Selector,
    typography: Selector,
}

/// Parses the store cards of a category listing page.
///
/// Entries are returned in page order, duplicates included.
#[derive(Clone)]
pub struct StoreListingParser {
    selectors: Arc<ListingSelectors>,
    fields: FieldSet,
}

impl StoreListingParser {
    pub fn new(fields: FieldSet) -> Result<Self, AppError> {
        let selectors = ListingSelectors {
            entry: selector(LISTING_ENTRY_SELECTOR)?,
            name: selector("h3")?,
            delivery_cost: selector(r#"span[data-testid="store-delivery-cost"]"#)?,
            typography: selector(r#"span[data-testid="typography"]"#)?,
        };
        Ok(Self {
            selectors: Arc::new(selectors),
            fields,
        })
    }
}

impl ListingParser for StoreListingParser {
    fn parse_listing(&self, job: &Job, html: &str) -> Result<Vec<Listing>, AppError> {
        let base = Url::parse(&job.url)
            .map_err(|e| AppError::Transport(format!("Invalid URL {}: {e}", job.url)))?;
        let document = Html::parse_document(html);
        let s = &self.selectors;

        let mut entries = Vec::new();
        for card in document.select(&s.entry) {
            let href = card.value().attr("href").map(str::trim);
            let Some(href) = href.filter(|h| !h.is_empty()) else {
                continue;
            };

            let labels: Vec<String> = card.select(&s.typography).map(element_text).collect();
            let delivery_time = labels.iter().find(|l| looks_like_duration(l)).cloned();
            let rating = if self.fields.ratings {
                labels.iter().find_map(|l| parse_rating(l))
            } else {
                None
            };
            let url = base
                .join(href)
                .map(String::from)
                .unwrap_or_else(|_| format!("{}{href}", base.origin().ascii_serialization()));

            entries.push(Listing {
                href: href.to_string(),
                name: first_text(card, &s.name).unwrap_or_default(),
                url,
                delivery_time,
                delivery_price: first_text(card, &s.delivery_cost),
                rating,
                category: job.category.clone(),
                category_index: job.category_index,
            });
        }

        if entries.is_empty() {
            return Err(AppError::MissingStructuredData(
                "no store cards on listing page".into(),
            ));
        }
        Ok(entries)
    }
}

/// A rating label is a bare decimal such as `4.7`.
fn parse_rating(label: &str) -> Option<f64> {
    let label = label.trim();
    let digits = label.chars().filter(char::is_ascii_digit).count();
    let dots = label.chars().filter(|c| *c == '.').count();
    if digits == 0 || dots > 1 || digits + dots != label.chars().count() {
        return None;
    }
    label.parse().ok()
}

fn looks_like_duration(label: &str) -> bool {
    label.contains("min") && label.chars().any(|c| c.is_ascii_digit())
}
