use std::sync::Arc;

use harvest_core::config::FieldSet;
use harvest_core::error::AppError;
use harvest_core::job_source::product_detail_url;
use harvest_core::models::{Job, MenuItem, Record, StoreMenu};
use harvest_core::traits::PageParser;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::html::{element_text, selector, strip_query};
use crate::price::parse_structured_price;

const PRODUCT_INFO_PREFIX: &str = "product-info-";

struct MenuSelectors {
    schema: Selector,
    product_info: Selector,
}

/// Parses a store page's full menu from its JSON-LD `Restaurant` schema.
///
/// Product URLs are resolved by matching each item name against the
/// `product-info-<id>` cards rendered on the page; items without a card
/// point at the store page itself.
#[derive(Clone)]
pub struct MenuParser {
    selectors: Arc<MenuSelectors>,
    fields: FieldSet,
}

impl MenuParser {
    pub fn new(fields: FieldSet) -> Result<Self, AppError> {
        let selectors = MenuSelectors {
            schema: selector(r#"script[type="application/ld+json"]#seo-structured-schema"#)?,
            product_info: selector(r#"div[data-qa^="product-info-"]"#)?,
        };
        Ok(Self {
            selectors: Arc::new(selectors),
            fields,
        })
    }
}

impl PageParser for MenuParser {
    fn parse(&self, job: &Job, html: &str) -> Result<Record, AppError> {
        let document = Html::parse_document(html);

        let script = document
            .select(&self.selectors.schema)
            .next()
            .ok_or_else(|| {
                AppError::MissingStructuredData("JSON-LD menu script not found".into())
            })?;
        let raw: String = script.text().collect();
        let schema: Value = serde_json::from_str(&raw)
            .map_err(|e| AppError::Decode(format!("invalid JSON-LD menu: {e}")))?;

        let store_url = strip_query(&job.url);

        // (id, lowercased card text) for every product card on the page.
        let cards: Vec<(String, String)> = document
            .select(&self.selectors.product_info)
            .filter_map(|div| {
                let id = div.value().attr("data-qa")?.strip_prefix(PRODUCT_INFO_PREFIX)?;
                (!id.is_empty()).then(|| (id.to_string(), element_text(div).to_lowercase()))
            })
            .collect();

        let sections = schema
            .get("hasMenu")
            .and_then(|menu| menu.get("hasMenuSection"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut items = Vec::new();
        for section in sections.iter().map(unwrap_nested) {
            let category = str_field(section, "name").unwrap_or_default();
            let entries = section
                .get("hasMenuItem")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for entry in entries.iter().map(unwrap_nested) {
                let Some(name) = str_field(entry, "name").filter(|n| !n.is_empty()) else {
                    tracing::debug!(url = %job.url, %category, "Skipping unnamed menu entry");
                    continue;
                };

                let description = if self.fields.descriptions {
                    str_field(entry, "description").unwrap_or_default()
                } else {
                    String::new()
                };
                let price = entry
                    .get("offers")
                    .and_then(|offers| offers.get("price"))
                    .map(structured_price)
                    .transpose()?
                    .unwrap_or(0.0);

                let needle = name.to_lowercase();
                let product_url = cards
                    .iter()
                    .find(|(_, text)| text.contains(&needle))
                    .map(|(id, _)| product_detail_url(&store_url, id))
                    .unwrap_or_else(|| store_url.clone());

                items.push(MenuItem {
                    name,
                    description,
                    price,
                    product_url,
                    store_url: store_url.clone(),
                    category: category.clone(),
                });
            }
        }

        Ok(Record::StoreMenu(StoreMenu {
            store_name: str_field(&schema, "name"),
            store_url,
            source_url: job.url.clone(),
            items,
        }))
    }
}

/// Sections and items are sometimes wrapped in one-element lists.
fn unwrap_nested(value: &Value) -> &Value {
    let mut current = value;
    while let Some(first) = current.as_array().and_then(|items| items.first()) {
        current = first;
    }
    current
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

fn structured_price(value: &Value) -> Result<f64, AppError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| AppError::Decode(format!("price {n} out of range"))),
        Value::String(s) => parse_structured_price(s)
            .ok_or_else(|| AppError::Decode(format!("unreadable price '{s}'"))),
        Value::Null => Ok(0.0),
        other => Err(AppError::Decode(format!("unexpected price value {other}"))),
    }
}
