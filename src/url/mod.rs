//! URL handling module for Catalog-Crawl
//!
//! Canonical product URLs, host extraction, and same-site checks used by
//! link classification and the catalog's dedup key.

mod domain;
mod normalize;

pub use domain::{extract_host, same_site, within_domain_root};
pub use normalize::{canonical_string, canonicalize_url};
