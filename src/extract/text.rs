use scraper::{ElementRef, Html, Node, Selector};

/// Collapses runs of whitespace into single spaces and trims
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Collapsed text content of an element
pub fn element_text(element: &ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Builds a selector, logging and skipping invalid ones
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            tracing::debug!(selector = css, error = ?e, "invalid CSS selector");
            None
        }
    }
}

/// Text of the body excluding script, style, and template contents
pub fn visible_text(document: &Html) -> String {
    let root = selector("body")
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    for node in root.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
                    .unwrap_or(false)
            });
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
    }
    collapse_whitespace(&out)
}

/// Content of the first `<meta>` whose `property` or `name` equals `key`
pub fn meta_content(document: &Html, key: &str) -> Option<String> {
    let sel = selector("meta[content]")?;
    document
        .select(&sel)
        .find(|m| {
            let value = m.value();
            value.attr("property") == Some(key) || value.attr("name") == Some(key)
        })
        .and_then(|m| m.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

/// First non-empty collapsed text among elements matching `css`
pub fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .map(|e| element_text(&e))
        .find(|s| !s.is_empty())
}

/// True when any ancestor element has a class containing one of `needles`
pub fn has_ancestor_class(element: &ElementRef, needles: &[&str]) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .and_then(|e| e.attr("class"))
            .map(|class| {
                class
                    .split_whitespace()
                    .any(|c| needles.iter().any(|n| c.eq_ignore_ascii_case(n)))
            })
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_and_truncate() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let html = Html::parse_document(
            "<html><body><p>SKU: A1</p><script>var sku = 'B2';</script><style>p{}</style></body></html>",
        );
        assert_eq!(visible_text(&html), "SKU: A1");
    }

    #[test]
    fn test_meta_content() {
        let html = Html::parse_document(
            r#"<html><head><meta property="og:image" content=" /a.jpg "><meta name="description" content="Desc"></head></html>"#,
        );
        assert_eq!(meta_content(&html, "og:image"), Some("/a.jpg".to_string()));
        assert_eq!(meta_content(&html, "description"), Some("Desc".to_string()));
        assert_eq!(meta_content(&html, "og:title"), None);
    }
}
