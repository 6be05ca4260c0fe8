//! Product image gallery discovery

use crate::extract::links::{resolve_link, RELATED_CONTAINERS};
use crate::extract::text::{has_ancestor_class, selector};
use scraper::{ElementRef, Html};
use url::Url;

/// Class fragments that mark an image carousel or thumbnail strip
const GALLERY_MARKERS: &[&str] = &["gallery", "slider", "carousel", "thumb"];

/// Attributes holding an image URL, lazy-load attributes last
pub const IMAGE_ATTRIBUTES: &[&str] = &["src", "data-src", "data-original", "data-lazy-src"];

/// Image URL of an element, skipping inline `data:` placeholders
pub fn image_source(element: &ElementRef) -> Option<String> {
    IMAGE_ATTRIBUTES
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(str::to_string)
}

fn is_decoration(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("icon") || lower.contains("logo")
}

/// True when one of the three nearest ancestors carries a gallery class
fn in_gallery_container(element: &ElementRef) -> bool {
    element.ancestors().take(3).any(|node| {
        node.value()
            .as_element()
            .and_then(|e| e.attr("class"))
            .map(|class| {
                let class = class.to_ascii_lowercase();
                GALLERY_MARKERS.iter().any(|m| class.contains(m))
            })
            .unwrap_or(false)
    })
}

/// Appends a resolved image URL unless it is already present
pub fn push_image(gallery: &mut Vec<String>, raw: &str, page_url: &Url) {
    if let Some(url) = resolve_link(raw, page_url) {
        let url = url.to_string();
        if !is_decoration(&url) && !gallery.contains(&url) {
            gallery.push(url);
        }
    }
}

/// Builds the gallery: declared images first, then the hero image, then
/// images found in gallery containers outside related-product blocks
pub fn discover_gallery(
    document: &Html,
    page_url: &Url,
    declared: &[String],
    hero: Option<&str>,
) -> Vec<String> {
    let mut gallery = Vec::new();

    for raw in declared.iter().map(String::as_str).chain(hero) {
        push_image(&mut gallery, raw, page_url);
    }

    if let Some(sel) = selector("img") {
        for img in document.select(&sel) {
            if has_ancestor_class(&img, RELATED_CONTAINERS) || !in_gallery_container(&img) {
                continue;
            }
            if let Some(src) = image_source(&img) {
                push_image(&mut gallery, &src, page_url);
            }
        }
    }

    gallery
}
