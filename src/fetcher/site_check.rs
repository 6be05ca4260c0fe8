//! One-shot reachability check for a brand site
//!
//! Used before a profile is crawled for the first time: it reports whether
//! the site answers and whether its pages need a JavaScript renderer.

use crate::{CatalogError, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use std::time::Duration;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Bodies shorter than this are treated as an empty app shell
const MIN_RENDERED_BODY: usize = 500;

const SCRIPT_WALL_PHRASES: &[&str] = &["enable javascript", "javascript is required"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteCheck {
    pub url: String,
    /// 2xx or 3xx
    pub accessible: bool,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub server: Option<String>,
    pub requires_rendering: bool,
}

/// True when the HTML cannot be extracted without running its scripts
pub fn requires_rendering(html: &str) -> bool {
    if html.len() < MIN_RENDERED_BODY {
        return true;
    }
    let lower = html.to_ascii_lowercase();
    SCRIPT_WALL_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn page_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let document = Html::parse_document(html);
    let title = document.select(&selector).next()?.text().collect::<String>();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn header(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Fetches `url` once and reports reachability and rendering needs
///
/// Server errors (5xx) and transport failures are returned as errors;
/// any other status produces a result.
pub async fn check_site(client: &Client, url: &str) -> Result<SiteCheck> {
    let response = client
        .get(url)
        .timeout(CHECK_TIMEOUT)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                CatalogError::Timeout { url: url.to_string() }
            } else {
                CatalogError::FetchFailed {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

    let status = response.status();
    if status.is_server_error() {
        return Err(CatalogError::FetchFailed {
            url: url.to_string(),
            message: format!("HTTP {}", status.as_u16()),
        });
    }

    let content_type = header(&response, reqwest::header::CONTENT_TYPE);
    let server = header(&response, reqwest::header::SERVER);
    let html = response.text().await.unwrap_or_default();

    let result = SiteCheck {
        url: url.to_string(),
        accessible: status.is_success() || status.is_redirection(),
        status_code: status.as_u16(),
        content_type,
        title: page_title(&html),
        server,
        requires_rendering: requires_rendering(&html),
    };
    tracing::info!(
        url,
        status = result.status_code,
        requires_rendering = result.requires_rendering,
        "site checked"
    );
    Ok(result)
}
