use std::sync::Arc;

use harvest_core::config::FieldSet;
use harvest_core::error::AppError;
use harvest_core::models::{Job, Product, ProductOption, Record};
use harvest_core::traits::PageParser;
use scraper::{Html, Selector};

use crate::html::{element_text, first_text, selector, strip_query};
use crate::price::normalize_price;

/// Selector the product detail modal is recognized by.
pub const PRODUCT_MODAL_SELECTOR: &str = r#"[data-qa="modal-name"]"#;

struct ProductSelectors {
    name: Selector,
    description: Selector,
    price: Selector,
    topping_item: Selector,
    typography: Selector,
    image: Selector,
}

/// Parses a store page opened on a product's detail modal
/// (`<store>?productDetail=<id>`).
#[derive(Clone)]
pub struct ProductParser {
    selectors: Arc<ProductSelectors>,
    fields: FieldSet,
}

impl ProductParser {
    pub fn new(fields: FieldSet) -> Result<Self, AppError> {
        let selectors = ProductSelectors {
            name: selector(PRODUCT_MODAL_SELECTOR)?,
            description: selector(r#"[data-testid="product-info"] p"#)?,
            price: selector(r#"[data-testid="price"]"#)?,
            topping_item: selector(r#"[data-qa="topping-list"] [data-qa="topping-item"]"#)?,
            typography: selector(r#"[data-testid="typography"]"#)?,
            image: selector(r#"[data-qa="modal-body"] img[src]"#)?,
        };
        Ok(Self {
            selectors: Arc::new(selectors),
            fields,
        })
    }
}

impl PageParser for ProductParser {
    fn parse(&self, job: &Job, html: &str) -> Result<Record, AppError> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let s = &self.selectors;

        let name = first_text(root, &s.name).ok_or_else(|| {
            AppError::MissingStructuredData("product modal name not found".into())
        })?;

        let price_label = first_text(root, &s.price)
            .ok_or_else(|| AppError::MissingStructuredData(format!("no price for '{name}'")))?;
        let price = normalize_price(&price_label)
            .ok_or_else(|| AppError::Decode(format!("unreadable price '{price_label}'")))?;

        let description = if self.fields.descriptions {
            first_text(root, &s.description)
        } else {
            None
        };

        let options = if self.fields.options {
            root.select(&s.topping_item)
                .filter_map(|item| {
                    let mut labels = item.select(&s.typography).map(element_text);
                    let name = labels.next().filter(|n| !n.is_empty())?;
                    let price = labels
                        .next()
                        .and_then(|label| normalize_price(&label))
                        .unwrap_or(0.0);
                    Some(ProductOption { name, price })
                })
                .collect()
        } else {
            Vec::new()
        };

        let image_url = if self.fields.images {
            root.select(&s.image)
                .find_map(|img| img.value().attr("src"))
                .map(str::to_string)
        } else {
            None
        };

        Ok(Record::Product(Product {
            name,
            price,
            description,
            options,
            image_url,
            store_url: strip_query(&job.url),
            source_url: job.url.clone(),
            category: job.category.clone(),
        }))
    }
}
