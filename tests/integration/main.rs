//! Integration tests for the catalog engine
//!
//! These tests use wiremock to stand in for brand websites and drive the
//! scanner and the job orchestrator end-to-end through the HTTP fetcher.

mod job_tests;
mod pattern_tests;
mod taxonomy_tests;

use catalog_crawl::config::UserAgentConfig;
use catalog_crawl::fetcher::{build_http_client, HttpFetcher, PageFetcher};
use catalog_crawl::profile::StaticCredentialStore;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

pub fn http_fetcher() -> Arc<dyn PageFetcher> {
    let client = build_http_client(&user_agent(), 5).expect("Failed to build client");
    Arc::new(HttpFetcher::new(client, Arc::new(StaticCredentialStore::new())))
}

/// Serves `html` at `route` with an HTML content type
pub async fn mount_page(server: &MockServer, route: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html.to_string(), "text/html"))
        .mount(server)
        .await;
}

pub fn product_page(name: &str, code: &str) -> String {
    format!(
        r#"<html><head><title>{name}</title></head>
        <body><h1>{name}</h1><p>SKU: {code}</p></body></html>"#
    )
}
