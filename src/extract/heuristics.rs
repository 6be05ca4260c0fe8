//! DOM heuristics used when neither structured metadata nor a recipe
//! supplies a field

use crate::extract::gallery::image_source;
use crate::extract::text::{element_text, first_text, meta_content, selector, visible_text};
use regex::Regex;
use scraper::Html;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use url::Url;

const HERO_SELECTORS: &str = "img#main-image, .product-image img, .gallery img";

const BREADCRUMB_SELECTORS: &str =
    r#".breadcrumb li, nav[aria-label="breadcrumb"] li, .breadcrumbs span, .path a"#;

const BREADCRUMB_SEPARATORS: &[&str] = &[">", "/", "»", "›", "|"];

const URL_STOP_WORDS: &[&str] = &["es", "en", "de", "productos", "producto", "product", "products"];

fn sku_regex() -> &'static Regex {
    static SKU: OnceLock<Regex> = OnceLock::new();
    SKU.get_or_init(|| {
        Regex::new(r"(?i)(?:Art\.|Ref\.|SKU|No\.)[:\s]+([A-Z0-9\-\.]+)")
            .unwrap_or_else(|e| panic!("invalid SKU pattern: {e}"))
    })
}

/// Name from `<h1>`, then `og:title`, then `<title>`
pub fn heuristic_name(document: &Html) -> Option<String> {
    first_text(document, "h1")
        .or_else(|| meta_content(document, "og:title"))
        .or_else(|| first_text(document, "title"))
}

/// Hero image from `og:image`, then well-known product image containers
pub fn heuristic_hero(document: &Html) -> Option<String> {
    meta_content(document, "og:image").or_else(|| {
        let sel = selector(HERO_SELECTORS)?;
        document.select(&sel).find_map(|img| image_source(&img))
    })
}

/// Reference code from labelled text such as `Ref.: AB-123`
pub fn heuristic_sku(document: &Html) -> Option<String> {
    sku_from_text(&visible_text(document))
}

pub(crate) fn sku_from_text(text: &str) -> Option<String> {
    sku_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(|c| c == '.' || c == '-').to_string())
        .find(|code| code.chars().any(|c| c.is_ascii_digit()))
}

/// Category path from breadcrumbs, else from the URL's directory segments
pub fn heuristic_category(document: &Html, page_url: &Url) -> Option<String> {
    breadcrumb_path(document).or_else(|| category_from_url(page_url))
}

fn breadcrumb_path(document: &Html) -> Option<String> {
    let sel = selector(BREADCRUMB_SELECTORS)?;
    let crumbs: Vec<String> = document
        .select(&sel)
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty() && !BREADCRUMB_SEPARATORS.contains(&t.as_str()))
        .fold(Vec::new(), |mut acc, crumb| {
            if acc.last() != Some(&crumb) {
                acc.push(crumb);
            }
            acc
        });

    (!crumbs.is_empty()).then(|| crumbs.join(" > "))
}

/// Directory segments minus language/product stop words; the last segment
/// names the product itself and is dropped
pub fn category_from_url(page_url: &Url) -> Option<String> {
    let mut segments: Vec<&str> = page_url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    segments.pop();

    let parts: Vec<String> = segments
        .into_iter()
        .filter(|s| !URL_STOP_WORDS.contains(&s.to_ascii_lowercase().as_str()))
        .map(|s| s.replace('-', " "))
        .collect();

    (!parts.is_empty()).then(|| parts.join(" > "))
}

/// Short description from the meta description tag
pub fn heuristic_description(document: &Html) -> Option<String> {
    meta_content(document, "description").or_else(|| meta_content(document, "og:description"))
}

/// Key/value features from two-column tables and definition lists
pub fn heuristic_features(document: &Html) -> BTreeMap<String, String> {
    let mut features = BTreeMap::new();

    if let (Some(row_sel), Some(cell_sel)) = (selector("table tr"), selector("th, td")) {
        for row in document.select(&row_sel) {
            let cells: Vec<String> = row.select(&cell_sel).map(|c| element_text(&c)).collect();
            if let [key, value] = cells.as_slice() {
                insert_feature(&mut features, key, value);
            }
        }
    }

    if let (Some(dt_sel), Some(dd_sel)) = (selector("dl dt"), selector("dl dd")) {
        let keys = document.select(&dt_sel).map(|e| element_text(&e));
        let values = document.select(&dd_sel).map(|e| element_text(&e));
        for (key, value) in keys.zip(values) {
            insert_feature(&mut features, &key, &value);
        }
    }

    features
}

pub(crate) fn insert_feature(features: &mut BTreeMap<String, String>, key: &str, value: &str) {
    let key = key.trim().trim_end_matches(':').trim();
    let value = value.trim();
    if !key.is_empty() && !value.is_empty() {
        features
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
}
