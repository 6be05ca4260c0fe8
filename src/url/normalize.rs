use crate::UrlError;
use url::Url;

/// Query parameters that never identify a product
///
/// Generic names like `ref` and `id` carry product references on brand sites
/// and must never be listed here.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_eid", "mc_cid", "srsltid", "_ga", "_gl",
];

/// Produces the canonical form of a product URL, the catalog's natural dedup key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host
/// 3. Collapse empty and dot segments, drop the trailing slash (except for root)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters and sort the rest by key
///
/// The scheme and any `www.` prefix are kept: a canonical URL must still be
/// fetchable as-is.
///
/// # Examples
///
/// ```
/// use catalog_crawl::url::canonicalize_url;
///
/// let url = canonicalize_url("https://Shop.Example.com/p/drill/?utm_source=x#specs").unwrap();
/// assert_eq!(url.as_str(), "https://shop.example.com/p/drill");
/// ```
pub fn canonicalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Returns the canonical string form, or the trimmed input when it cannot be parsed
pub fn canonical_string(url_str: &str) -> String {
    canonicalize_url(url_str)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url_str.trim().to_string())
}

/// Removes empty and dot segments and the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme_and_www() {
        let result = canonicalize_url("http://www.example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://www.example.com/page");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = canonicalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = canonicalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = canonicalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_tracking_params_and_sorting() {
        let result = canonicalize_url(
            "https://example.com/page?variant=2&utm_medium=email&color=red&fbclid=123",
        )
        .unwrap();
        assert_eq!(
            result.as_str(),
            "https://example.com/page?color=red&variant=2"
        );
    }

    #[test]
    fn test_product_reference_params_survive() {
        let a = canonical_string("https://x.com/detail.php?ref=AB12&utm_source=news");
        let b = canonical_string("https://x.com/detail.php?ref=CD34");
        assert_eq!(a, "https://x.com/detail.php?ref=AB12");
        assert_eq!(b, "https://x.com/detail.php?ref=CD34");
    }

    #[test]
    fn test_only_tracking_params() {
        let result = canonicalize_url("https://example.com/page?utm_source=a&gclid=c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_query_values_stay_encoded() {
        let result = canonicalize_url("https://example.com/search?q=drill%20bit&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/search?a=1&q=drill+bit");
    }

    #[test]
    fn test_dot_segments_and_slashes() {
        let result = canonicalize_url("https://example.com///a/../b/./c//").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_lowercase_host_only() {
        let result = canonicalize_url("https://EXAMPLE.COM/Page/ABC-1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page/ABC-1");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonicalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(canonicalize_url("not a url").is_err());
        assert_eq!(canonical_string(" not a url "), "not a url");
    }

    #[test]
    fn test_equivalent_urls_share_canonical_form() {
        let a = canonical_string("https://example.com/p/drill/#top");
        let b = canonical_string("https://EXAMPLE.com/p/drill?utm_campaign=spring");
        assert_eq!(a, b);
    }
}
