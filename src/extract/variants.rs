//! Variant extraction
//!
//! Runs as its own pass over the HTML so the main extraction never depends
//! on it; callers treat any failure here as "no variants".

use crate::extract::files::FileKind;
use crate::extract::links::resolve_link;
use crate::extract::text::{element_text, selector};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// One purchasable variant of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub variant_code: Option<String>,
    pub dimension: String,
    pub pdf_urls: Vec<String>,
}

const CODE_HEADERS: &[&str] = &["code", "ref", "sku", "art", "codigo", "código", "referencia"];
const DIMENSION_HEADERS: &[&str] = &[
    "dim", "size", "medida", "format", "measure", "mm", "cm", "talla", "misura",
];

/// Extracts variants from option selectors and variant tables
pub fn extract_variants(html: &str, page_url: &Url) -> Vec<Variant> {
    let document = Html::parse_document(html);

    let mut candidates = select_options(&document);
    candidates.extend(variant_tables(&document, page_url));

    apply_guardrails(candidates)
}

/// With more than one candidate, a dimension must contain a digit;
/// duplicates by normalized dimension are dropped
fn apply_guardrails(candidates: Vec<Variant>) -> Vec<Variant> {
    let multiple = candidates.len() > 1;
    let mut seen = HashSet::new();

    candidates
        .into_iter()
        .filter(|v| !multiple || v.dimension.chars().any(|c| c.is_ascii_digit()))
        .filter(|v| seen.insert(normalize_dimension(&v.dimension)))
        .collect()
}

fn normalize_dimension(dimension: &str) -> String {
    dimension
        .to_lowercase()
        .replace('×', "x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn in_page_chrome(element: &ElementRef) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .map(|e| matches!(e.name(), "header" | "footer" | "nav"))
            .unwrap_or(false)
    })
}

fn looks_like_code(value: &str) -> bool {
    value.len() >= 2
        && value.chars().any(|c| c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/'))
}

fn is_placeholder_option(text: &str, value: Option<&str>) -> bool {
    let lower = text.to_lowercase();
    value.map(str::trim) == Some("")
        || lower.starts_with("select")
        || lower.starts_with("choose")
        || lower.starts_with("selecciona")
        || lower.starts_with("elige")
        || lower.starts_with("--")
}

fn select_options(document: &Html) -> Vec<Variant> {
    let (Some(select_sel), Some(option_sel)) = (selector("select"), selector("option")) else {
        return Vec::new();
    };

    let mut variants = Vec::new();
    for select in document.select(&select_sel) {
        if in_page_chrome(&select) {
            continue;
        }
        for option in select.select(&option_sel) {
            let text = element_text(&option);
            let value = option.value().attr("value");
            if text.is_empty() || is_placeholder_option(&text, value) {
                continue;
            }

            let variant_code = ["data-sku", "data-code"]
                .iter()
                .find_map(|attr| option.value().attr(attr))
                .or(value)
                .map(str::trim)
                .filter(|v| looks_like_code(v))
                .map(str::to_string);

            variants.push(Variant {
                variant_code,
                dimension: text,
                pdf_urls: Vec::new(),
            });
        }
    }
    variants
}

fn header_index(headers: &[String], needles: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| needles.iter().any(|n| h.contains(n)))
}

fn variant_tables(document: &Html, page_url: &Url) -> Vec<Variant> {
    let (Some(table_sel), Some(row_sel), Some(cell_sel), Some(link_sel)) = (
        selector("table"),
        selector("tr"),
        selector("th, td"),
        selector("a[href]"),
    ) else {
        return Vec::new();
    };

    let mut variants = Vec::new();
    for table in document.select(&table_sel) {
        let mut rows = table.select(&row_sel);
        let Some(header_row) = rows.next() else {
            continue;
        };
        let headers: Vec<String> = header_row
            .select(&cell_sel)
            .map(|c| element_text(&c).to_lowercase())
            .collect();

        let (Some(code_idx), Some(dim_idx)) = (
            header_index(&headers, CODE_HEADERS),
            header_index(&headers, DIMENSION_HEADERS),
        ) else {
            continue;
        };

        for row in rows {
            let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
            let (Some(code_cell), Some(dim_cell)) = (cells.get(code_idx), cells.get(dim_idx))
            else {
                continue;
            };

            let dimension = element_text(dim_cell);
            if dimension.is_empty() {
                continue;
            }
            let code = element_text(code_cell);

            let pdf_urls = row
                .select(&link_sel)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| resolve_link(href, page_url))
                .filter(|u| FileKind::from_url(u) == Some(FileKind::Document))
                .map(|u| u.to_string())
                .fold(Vec::new(), |mut acc, u| {
                    if !acc.contains(&u) {
                        acc.push(u);
                    }
                    acc
                });

            variants.push(Variant {
                variant_code: (!code.is_empty()).then_some(code),
                dimension,
                pdf_urls,
            });
        }
    }
    variants
}
