use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_crawl::url::extract_host;
///
/// let url = Url::parse("https://Shop.Example.com/path").unwrap();
/// assert_eq!(extract_host(&url), Some("shop.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true when both URLs point at the same site
///
/// Hosts are compared case-insensitively with a leading `www.` ignored,
/// and ports must match.
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => {
            bare_host(ha) == bare_host(hb) && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}

/// Returns true when `url` belongs to the given domain root (or a subdomain of it)
pub fn within_domain_root(url: &Url, domain_root: &str) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = bare_host(host);
    let root = bare_host(domain_root.split(':').next().unwrap_or(domain_root));
    host == root || host.ends_with(&format!(".{}", root))
}

fn bare_host(host: &str) -> String {
    let lower = host.to_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}
