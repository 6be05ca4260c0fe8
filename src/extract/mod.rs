//! Extraction Engine
//!
//! Turns a fetched product page into a [`ProductRecord`]. Every field falls
//! through three layers and the first non-empty value wins:
//!
//! 1. Embedded JSON-LD product metadata
//! 2. The brand profile's declarative selector recipe
//! 3. Generic DOM heuristics
//!
//! Malformed HTML never fails extraction; absent fields are simply left
//! empty. Only an unusable input (empty body, binary content, or an
//! unparsable page URL) returns [`CatalogError::Unextractable`].

mod classify;
mod files;
mod gallery;
mod heuristics;
mod links;
mod metadata;
mod recipe;
mod text;
mod variants;

pub use classify::{classify, PageClass};
pub use files::{FileKind, FileRef, FALLBACK_FILE_NAME};
pub use links::{
    extract_associated, extract_navigation, name_from_url, AssociatedProduct, AssociationKind,
    LinkRef, NavigationLinks,
};
pub use metadata::ProductMetadata;
pub use variants::{extract_variants, Variant};

use crate::profile::ExtractionRules;
use crate::{CatalogError, Result};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Structured product data extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub url: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub category_path: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub hero_image: Option<String>,
    #[serde(default)]
    pub gallery: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub associated: Vec<AssociatedProduct>,
    #[serde(default)]
    pub features: BTreeMap<String, String>,
}

impl ProductRecord {
    /// A record counts as found when it identifies a product by name or code
    pub fn has_product_data(&self) -> bool {
        self.name.is_some() || self.code.is_some()
    }
}

/// Extracts a product record using only metadata and generic heuristics
pub fn extract_product(html: &str, page_url: &str) -> Result<ProductRecord> {
    extract_product_with_rules(html, page_url, &ExtractionRules::default())
}

/// Extracts a product record, consulting the profile's selector recipe
/// between the metadata and heuristic layers
pub fn extract_product_with_rules(
    html: &str,
    page_url: &str,
    rules: &ExtractionRules,
) -> Result<ProductRecord> {
    let url = Url::parse(page_url).map_err(|e| CatalogError::Unextractable {
        url: page_url.to_string(),
        message: format!("invalid page URL: {}", e),
    })?;

    if html.trim().is_empty() {
        return Err(CatalogError::Unextractable {
            url: page_url.to_string(),
            message: "empty response body".to_string(),
        });
    }
    if html.contains('\0') {
        return Err(CatalogError::Unextractable {
            url: page_url.to_string(),
            message: "response body is not text".to_string(),
        });
    }

    // The parsed document is not Send, so the variant pass parses its own copy
    std::thread::scope(|scope| {
        let variant_pass = scope.spawn(|| extract_variants(html, &url));

        let mut record = extract_fields(html, &url, rules);

        record.variants = match variant_pass.join() {
            Ok(variants) => variants,
            Err(_) => {
                tracing::warn!(url = %url, "variant extraction panicked, continuing without variants");
                Vec::new()
            }
        };
        Ok(record)
    })
}

fn extract_fields(html: &str, url: &Url, rules: &ExtractionRules) -> ProductRecord {
    let document = Html::parse_document(html);
    let metadata = metadata::extract_product_metadata(&document).unwrap_or_default();
    let recipe_rules = &rules.recipe;
    let from_recipe = |field: &str| recipe::recipe_value(&document, url, recipe_rules, field);

    let name = metadata
        .name
        .clone()
        .or_else(|| from_recipe("name"))
        .or_else(|| heuristics::heuristic_name(&document));

    let code = metadata
        .sku
        .clone()
        .or_else(|| from_recipe("code"))
        .or_else(|| from_recipe("sku"))
        .or_else(|| heuristics::heuristic_sku(&document));

    let category_path = metadata
        .category
        .clone()
        .or_else(|| from_recipe("category"))
        .or_else(|| heuristics::heuristic_category(&document, url));

    let description = metadata
        .description
        .clone()
        .or_else(|| from_recipe("description"))
        .or_else(|| heuristics::heuristic_description(&document));

    let brand = metadata.brand.clone().or_else(|| from_recipe("brand"));

    let hero_raw = metadata
        .images
        .first()
        .cloned()
        .or_else(|| from_recipe("hero_image"))
        .or_else(|| from_recipe("image"))
        .or_else(|| heuristics::heuristic_hero(&document));
    let hero_image = hero_raw
        .as_deref()
        .and_then(|raw| links::resolve_link(raw, url))
        .map(|u| u.to_string());

    let mut declared = metadata.images.clone();
    declared.extend(recipe::recipe_values(&document, url, recipe_rules, "gallery"));
    let gallery = gallery::discover_gallery(&document, url, &declared, hero_image.as_deref());

    let mut files = files::discover_files(&document, url);
    for value in recipe::recipe_values(&document, url, recipe_rules, "files") {
        let Some(resolved) = links::resolve_link(&value, url) else {
            continue;
        };
        if let Some(kind) = FileKind::from_url(&resolved) {
            files::push_file(
                &mut files,
                FileRef {
                    url: resolved.to_string(),
                    name: FALLBACK_FILE_NAME.to_string(),
                    kind,
                },
            );
        }
    }

    let mut features = BTreeMap::new();
    for (key, value) in &metadata.properties {
        heuristics::insert_feature(&mut features, key, value);
    }
    for (key, value) in heuristics::heuristic_features(&document) {
        features.entry(key).or_insert(value);
    }

    ProductRecord {
        url: url.to_string(),
        name,
        code,
        category_path,
        description,
        brand,
        hero_image,
        gallery,
        files,
        variants: Vec::new(),
        associated: links::extract_associated(&document, url),
        features,
    }
}
