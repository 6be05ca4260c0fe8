//! Declarative selector recipes from a brand profile's extraction rules

use crate::extract::gallery::IMAGE_ATTRIBUTES;
use crate::extract::links::resolve_link;
use crate::extract::text::{collapse_whitespace, element_text, selector};
use crate::profile::{is_image_field, is_url_field, ExtractStrategy, SelectorRecipe, SelectorTarget};
use scraper::{ElementRef, Html};
use url::Url;

/// Reads every accepted value a recipe field selects, in document order
pub fn recipe_values(document: &Html, page_url: &Url, recipe: &SelectorRecipe, field: &str) -> Vec<String> {
    match recipe.target(field) {
        Some(target) => target_values(document, page_url, target, field),
        None => Vec::new(),
    }
}

/// First accepted value of a recipe field
pub fn recipe_value(document: &Html, page_url: &Url, recipe: &SelectorRecipe, field: &str) -> Option<String> {
    recipe_values(document, page_url, recipe, field).into_iter().next()
}

fn target_values(document: &Html, page_url: &Url, target: &SelectorTarget, field: &str) -> Vec<String> {
    let Some(sel) = selector(&target.selector) else {
        return Vec::new();
    };

    let mut values: Vec<String> = Vec::new();
    for element in document.select(&sel) {
        let Some(value) = read_element(&element, target, field, page_url) else {
            continue;
        };
        if target.accepts(&value) && !values.contains(&value) {
            values.push(value);
        }
    }
    values
}

fn read_element(element: &ElementRef, target: &SelectorTarget, field: &str, page_url: &Url) -> Option<String> {
    match target.effective_strategy(field) {
        ExtractStrategy::Text => Some(element_text(element)).filter(|t| !t.is_empty()),
        ExtractStrategy::Html => Some(element.inner_html().trim().to_string()).filter(|t| !t.is_empty()),
        ExtractStrategy::Attribute => {
            let attribute = target.effective_attribute(field);
            let raw = element
                .value()
                .attr(&attribute)
                .map(collapse_whitespace)
                .filter(|v| !v.is_empty() && !v.starts_with("data:"))
                .or_else(|| lazy_image_source(element, field))?;

            if attribute == "href" || attribute == "src" || is_url_field(field) {
                resolve_link(&raw, page_url).map(|u| u.to_string())
            } else {
                Some(raw)
            }
        }
    }
}

/// Lazy-loaded images keep the real URL in a data attribute
fn lazy_image_source(element: &ElementRef, field: &str) -> Option<String> {
    if !is_image_field(field) {
        return None;
    }
    IMAGE_ATTRIBUTES
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty() && !v.starts_with("data:"))
        .map(str::to_string)
}
