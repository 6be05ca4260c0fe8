//! Embedded structured metadata (schema.org JSON-LD)
//!
//! The first `Product` object found in any `application/ld+json` block is
//! treated as the page's authoritative product description.

use crate::extract::text::{collapse_whitespace, selector};
use scraper::Html;
use serde_json::Value;

/// Product fields read from a JSON-LD block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductMetadata {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub images: Vec<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub properties: Vec<(String, String)>,
}

const PRODUCT_TYPES: &[&str] = &["Product", "ProductGroup", "IndividualProduct", "ProductModel"];

/// Finds the first JSON-LD product description in the document
pub fn extract_product_metadata(document: &Html) -> Option<ProductMetadata> {
    let sel = selector(r#"script[type="application/ld+json"]"#)?;

    for script in document.select(&sel) {
        let raw = script.text().collect::<String>();
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed JSON-LD block");
                continue;
            }
        };

        if let Some(product) = candidates(&value).into_iter().find(|v| is_product(v)) {
            return Some(read_product(product));
        }
    }

    None
}

/// Top-level object, array members, and `@graph` members
fn candidates(value: &Value) -> Vec<&Value> {
    let mut out: Vec<&Value> = match value.as_array() {
        Some(items) => items.iter().collect(),
        None => vec![value],
    };

    let graphs: Vec<&Value> = out
        .iter()
        .filter_map(|item| item.get("@graph").and_then(Value::as_array))
        .flat_map(|graph| graph.iter())
        .collect();
    out.extend(graphs);
    out
}

fn is_product(item: &Value) -> bool {
    match item.get("@type") {
        Some(Value::String(t)) => PRODUCT_TYPES.iter().any(|p| t.eq_ignore_ascii_case(p)),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(|t| {
            PRODUCT_TYPES.iter().any(|p| t.eq_ignore_ascii_case(p))
        }),
        _ => false,
    }
}

fn read_product(item: &Value) -> ProductMetadata {
    ProductMetadata {
        name: string_field(item.get("name")),
        sku: ["sku", "mpn", "productID"]
            .iter()
            .find_map(|key| string_field(item.get(*key))),
        images: image_urls(item.get("image")),
        category: category(item.get("category")),
        description: string_field(item.get("description")),
        brand: named_field(item.get("brand")),
        properties: properties(item.get("additionalProperty")),
    }
}

/// Strings and numbers, collapsed; empty values are absent
fn string_field(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => collapse_whitespace(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// A plain string or an object carrying `name`
fn named_field(value: Option<&Value>) -> Option<String> {
    match value? {
        obj @ Value::Object(_) => string_field(obj.get("name")),
        Value::Array(items) => items.iter().find_map(|v| named_field(Some(v))),
        other => string_field(Some(other)),
    }
}

/// `image` may be a string, an `ImageObject`, or an array of either
fn image_urls(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Object(obj)) => ["url", "contentUrl"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(|s| vec![s.trim().to_string()])
            .unwrap_or_default(),
        Some(Value::Array(items)) => items.iter().flat_map(|v| image_urls(Some(v))).collect(),
        _ => Vec::new(),
    }
}

fn category(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(|v| named_field(Some(v))).collect();
            (!parts.is_empty()).then(|| parts.join(" > "))
        }
        other => named_field(Some(other)),
    }
}

fn properties(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|p| Some((string_field(p.get("name"))?, string_field(p.get("value"))?)))
                .collect()
        })
        .unwrap_or_default()
}
