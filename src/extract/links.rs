//! Link resolution and navigation extraction
//!
//! Links are resolved against the page URL, restricted to the page's own
//! site, and sorted into product links and category (sub-navigation) links
//! by the shape of their path.

use crate::extract::text::{element_text, has_ancestor_class, selector};
use crate::url::same_site;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use url::Url;

/// Path fragments that mark a product detail page
pub const PRODUCT_PATTERNS: &[&str] = &[
    "/product/", "/producto/", "/produto/", "/prodotto/", "/item/", "/p/", "/article/",
];

/// Path fragments that mark a category, family, or collection page
pub const CATEGORY_PATTERNS: &[&str] = &[
    "/products/", "/productos/", "/produtos/", "/category/", "/categoria/", "/collection/",
    "/collections/", "/coleccion/", "/collezioni/", "/collezione/", "/series/", "/serie/",
    "/tipologia/", "/tipology/", "/ambiente/", "/linea/",
];

/// Paths never worth following for catalog discovery
const DISALLOWED_PATHS: &[&str] = &[
    "/login", "/account", "/carrito", "/cart", "/checkout", "/blog", "/news", "/press", "/jobs",
    "/privacy", "/terms", "/imprint", "/contact",
];

/// Extensions of linked assets, which are never pages
const ASSET_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "pdf", "zip", "dwg", "dxf", "step", "stp", "css",
    "js", "mp4", "xml",
];

/// Containers holding links to other products rather than page content
pub const RELATED_CONTAINERS: &[&str] = &[
    "related",
    "related-products",
    "associated-products",
    "cross-sells",
    "upsells",
    "products-grid",
    "accessories",
    "spare-parts",
];

/// A named link to another page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub url: String,
    pub name: String,
}

/// Same-site links sorted by path shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationLinks {
    pub product_links: Vec<LinkRef>,
    pub category_links: Vec<LinkRef>,
}

/// How an associated product relates to the page it was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    Related,
    Accessory,
    SparePart,
}

/// A product linked from another product's page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedProduct {
    pub url: String,
    pub name: String,
    pub kind: AssociationKind,
}

/// Resolves a link href to an absolute URL without fragment
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - invalid URLs
/// - non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}

/// Display name of a link: its text, else its `title` attribute
pub fn link_name(element: &ElementRef) -> String {
    let text = element_text(element);
    if !text.is_empty() {
        return text;
    }
    element
        .value()
        .attr("title")
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

fn is_asset(url: &Url) -> bool {
    url.path()
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_disallowed(path: &str) -> bool {
    DISALLOWED_PATHS.iter().any(|d| path.contains(d))
}

/// Returns true when the path has the shape of a product detail page
pub fn is_product_path(path: &str) -> bool {
    let path = path.to_ascii_lowercase();
    PRODUCT_PATTERNS.iter().any(|p| path.contains(p))
}

/// Returns true when the path has the shape of a category page
pub fn is_category_path(path: &str) -> bool {
    let path = path.to_ascii_lowercase();
    path.len() > 3
        && CATEGORY_PATTERNS
            .iter()
            .any(|p| path.contains(p) || path.ends_with(p.trim_end_matches('/')))
}

/// Inserts a link, keeping the longer name when the URL is already present
fn push_unique(links: &mut Vec<LinkRef>, url: String, name: String) {
    match links.iter_mut().find(|l| l.url == url) {
        Some(existing) => {
            if name.chars().count() > existing.name.chars().count() {
                existing.name = name;
            }
        }
        None => links.push(LinkRef { url, name }),
    }
}

/// Sorts the page's same-site links into product and category links
///
/// Product links need a name longer than two characters; category links
/// fall back to a name derived from their URL.
pub fn extract_navigation(document: &Html, page_url: &Url) -> NavigationLinks {
    let mut nav = NavigationLinks::default();
    let Some(sel) = selector("a[href]") else {
        return nav;
    };

    for element in document.select(&sel) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_link(href, page_url) else {
            continue;
        };

        let lower_path = url.path().to_ascii_lowercase();
        if !same_site(&url, page_url)
            || url.as_str() == page_url.as_str()
            || is_asset(&url)
            || is_disallowed(&lower_path)
        {
            continue;
        }

        let name = link_name(&element);
        if is_product_path(&lower_path) {
            if name.chars().count() > 2 {
                push_unique(&mut nav.product_links, url.to_string(), name);
            }
        } else if is_category_path(&lower_path) {
            let name = if name.is_empty() { name_from_url(&url) } else { name };
            push_unique(&mut nav.category_links, url.to_string(), name);
        }
    }

    nav
}

/// Products linked from related, accessory, and cross-sell blocks
pub fn extract_associated(document: &Html, page_url: &Url) -> Vec<AssociatedProduct> {
    let mut out: Vec<AssociatedProduct> = Vec::new();
    let Some(sel) = selector("a[href]") else {
        return out;
    };

    for element in document.select(&sel) {
        if !has_ancestor_class(&element, RELATED_CONTAINERS) {
            continue;
        }
        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, page_url))
        else {
            continue;
        };
        if !same_site(&url, page_url) || url.as_str() == page_url.as_str() || is_asset(&url) {
            continue;
        }

        let kind = if has_ancestor_class(&element, &["accessories"]) {
            AssociationKind::Accessory
        } else if has_ancestor_class(&element, &["spare-parts"]) {
            AssociationKind::SparePart
        } else {
            AssociationKind::Related
        };

        let url = url.to_string();
        let name = link_name(&element);
        match out.iter_mut().find(|a| a.url == url) {
            Some(existing) => {
                if existing.name.is_empty() {
                    existing.name = name;
                }
            }
            None => out.push(AssociatedProduct { url, name, kind }),
        }
    }

    out
}

/// Human-readable name from the last path segment: `power-tools` -> `Power tools`
pub fn name_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default()
        .replace(|c| c == '-' || c == '_', " ");

    let mut chars = segment.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => url.host_str().unwrap_or_default().to_string(),
    }
}
