//! Hub/leaf page classification

use crate::extract::links::{extract_navigation, NavigationLinks};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// What a crawled page contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageClass {
    /// Links to sub-categories but no products
    Hub,
    /// Links directly to product pages
    Leaf,
    Unknown,
}

impl fmt::Display for PageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageClass::Hub => "hub",
            PageClass::Leaf => "leaf",
            PageClass::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Classifies a page by the shape of its same-site links
///
/// A page is a leaf when it links at least one product-shaped URL, a hub
/// when it links at least one category-shaped URL, and unknown otherwise.
/// An unparsable page URL classifies as unknown.
pub fn classify(html: &str, page_url: &str) -> PageClass {
    let Ok(url) = Url::parse(page_url) else {
        return PageClass::Unknown;
    };
    classify_document(&Html::parse_document(html), &url)
}

fn classify_document(document: &Html, page_url: &Url) -> PageClass {
    PageClass::from_navigation(&extract_navigation(document, page_url))
}

impl PageClass {
    /// Classification of a page whose navigation links were already extracted
    pub fn from_navigation(nav: &NavigationLinks) -> PageClass {
        if !nav.product_links.is_empty() {
            PageClass::Leaf
        } else if !nav.category_links.is_empty() {
            PageClass::Hub
        } else {
            PageClass::Unknown
        }
    }
}
