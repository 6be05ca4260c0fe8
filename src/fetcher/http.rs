//! reqwest-backed fetcher
//!
//! Status classification:
//!
//! | Condition | Error |
//! |-----------|-------|
//! | HTTP 401 / 403, or redirected to the login page | AuthRequired |
//! | HTTP 404 / 410 | NotFound |
//! | HTTP 429 / 5xx / other | FetchFailed (transient) |
//! | Timeout | Timeout (transient) |
//! | Connection error | FetchFailed (transient) |
//! | Binary Content-Type (PDF, image, archive) | Unextractable |
//!
//! Downloads invert the last rule: an HTML body where a file was expected
//! is Unextractable.

use crate::config::UserAgentConfig;
use crate::fetcher::{FetchedFile, FetchedPage, PageFetcher};
use crate::profile::{BrandProfile, CredentialStore};
use crate::{CatalogError, Result};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Builds an HTTP client with the crawler's user agent and a cookie jar
///
/// # Example
///
/// ```no_run
/// use catalog_crawl::config::UserAgentConfig;
/// use catalog_crawl::fetcher::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "CatalogCrawl".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "bot@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, 30).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout_secs: u64) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher over a shared reqwest client
pub struct HttpFetcher {
    client: Client,
    profiles: HashMap<String, BrandProfile>,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpFetcher {
    pub fn new(client: Client, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client,
            profiles: HashMap::new(),
            credentials,
        }
    }

    /// Registers profiles whose login flows this fetcher may run
    pub fn with_profiles<I>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = BrandProfile>,
    {
        for profile in profiles {
            self.profiles.insert(profile.id.clone(), profile);
        }
        self
    }

    fn profile(&self, profile_id: &str) -> Result<&BrandProfile> {
        self.profiles
            .get(profile_id)
            .ok_or_else(|| CatalogError::ProfileNotFound(profile_id.to_string()))
    }

    /// True when the response landed on the profile's login page
    fn redirected_to_login(&self, final_url: &Url, requested: &str, auth_profile: Option<&str>) -> bool {
        let Some(login_url) = auth_profile
            .and_then(|id| self.profiles.get(id))
            .and_then(|p| p.login_url.as_deref())
            .and_then(|u| Url::parse(u).ok())
        else {
            return false;
        };
        final_url.as_str() != requested
            && final_url.host_str() == login_url.host_str()
            && final_url.path() == login_url.path()
    }
}

fn classify_request_error(url: &str, err: reqwest::Error) -> CatalogError {
    if err.is_timeout() {
        CatalogError::Timeout { url: url.to_string() }
    } else if err.is_connect() {
        CatalogError::FetchFailed {
            url: url.to_string(),
            message: "connection refused".to_string(),
        }
    } else {
        CatalogError::FetchFailed {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn classify_status(url: &str, status: StatusCode) -> Option<CatalogError> {
    if status.is_success() {
        return None;
    }
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CatalogError::AuthRequired {
            url: url.to_string(),
        },
        StatusCode::NOT_FOUND | StatusCode::GONE => CatalogError::NotFound {
            url: url.to_string(),
        },
        _ => CatalogError::FetchFailed {
            url: url.to_string(),
            message: format!("HTTP {}", status.as_u16()),
        },
    };
    Some(err)
}

const BINARY_CONTENT_TYPES: &[&str] = &[
    "image/",
    "video/",
    "audio/",
    "font/",
    "application/pdf",
    "application/zip",
    "application/octet-stream",
];

/// Anything textual is handed to extraction; binary downloads are not pages
fn is_page_content(content_type: &str) -> bool {
    !BINARY_CONTENT_TYPES.iter().any(|t| content_type.starts_with(t))
}

fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// File name from a `Content-Disposition` header such as
/// `attachment; filename="drill.stp"`
fn disposition_file_name(response: &reqwest::Response) -> Option<String> {
    let header = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').trim().to_string())
        .filter(|name| !name.is_empty())
}

impl HttpFetcher {
    /// Sends a GET and applies status and login-redirect classification
    async fn get_checked(&self, url: &str, accept: &str, auth_profile: Option<&str>) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        if let Some(err) = classify_status(url, response.status()) {
            return Err(err);
        }
        if self.redirected_to_login(response.url(), url, auth_profile) {
            return Err(CatalogError::AuthRequired { url: url.to_string() });
        }
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, auth_profile: Option<&str>) -> Result<FetchedPage> {
        tracing::debug!(url, profile = auth_profile, "fetching page");

        let response = self
            .get_checked(url, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8", auth_profile)
            .await?;
        let final_url = response.url().clone();

        let content_type = content_type(&response);
        if !is_page_content(&content_type) {
            return Err(CatalogError::Unextractable {
                url: url.to_string(),
                message: format!("content type {} is not HTML", content_type),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        Ok(FetchedPage {
            final_url: final_url.to_string(),
            html,
        })
    }

    async fn download(&self, url: &str, auth_profile: Option<&str>) -> Result<FetchedFile> {
        tracing::debug!(url, profile = auth_profile, "downloading file");

        let response = self.get_checked(url, "*/*", auth_profile).await?;
        let final_url = response.url().to_string();
        let content_type = content_type(&response);
        let file_name = disposition_file_name(&response);

        // A login or error page served with 200 is not the file
        if content_type.starts_with("text/html") {
            return Err(CatalogError::Unextractable {
                url: url.to_string(),
                message: "expected a file, got an HTML page".to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        Ok(FetchedFile {
            final_url,
            bytes: bytes.to_vec(),
            content_type,
            file_name,
        })
    }

    async fn login(&self, profile_id: &str) -> Result<()> {
        let profile = self.profile(profile_id)?;
        let (Some(credential_id), Some(login_url)) =
            (profile.credential_id.as_deref(), profile.login_url.as_deref())
        else {
            return Err(CatalogError::CredentialUnavailable(profile_id.to_string()));
        };

        let credential = self.credentials.reveal(credential_id)?;
        tracing::info!(profile = profile_id, "running login flow");

        let response = self
            .client
            .post(login_url)
            .form(&[
                ("username", credential.username.as_str()),
                ("password", credential.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_request_error(login_url, e))?;

        match classify_status(login_url, response.status()) {
            None => Ok(()),
            Some(CatalogError::FetchFailed { .. }) | Some(CatalogError::NotFound { .. }) => {
                Err(CatalogError::AuthRequired {
                    url: login_url.to_string(),
                })
            }
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::StaticCredentialStore;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn fetcher(profiles: Vec<BrandProfile>) -> HttpFetcher {
        let client = build_http_client(&create_test_config(), 5).unwrap();
        let credentials = StaticCredentialStore::new().with("acme-login", "bot", "s3cret");
        HttpFetcher::new(client, Arc::new(credentials)).with_profiles(profiles)
    }

    fn private_profile(server: &MockServer) -> BrandProfile {
        let mut profile = BrandProfile::public("acme", "Acme", "127.0.0.1");
        profile.auth_required = true;
        profile.credential_id = Some("acme-login".to_string());
        profile.login_url = Some(format!("{}/login", server.uri()));
        profile
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config(), 30).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p/drill"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<h1>Drill</h1>")
                    .insert_header("content-type", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/p/drill", server.uri());
        let page = fetcher(Vec::new()).fetch(&url, None).await.unwrap();
        assert_eq!(page.html, "<h1>Drill</h1>");
        assert_eq!(page.final_url, url);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        for (route, status) in [("/missing", 404), ("/boom", 503), ("/private", 401)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }
        let f = fetcher(Vec::new());

        let missing = f.fetch(&format!("{}/missing", server.uri()), None).await;
        assert!(matches!(missing, Err(CatalogError::NotFound { .. })));

        let boom = f.fetch(&format!("{}/boom", server.uri()), None).await;
        assert!(matches!(boom, Err(CatalogError::FetchFailed { .. })));

        let private = f.fetch(&format!("{}/private", server.uri()), None).await;
        assert!(matches!(private, Err(CatalogError::AuthRequired { .. })));
    }

    #[tokio::test]
    async fn test_non_html_is_unextractable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manual.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
            )
            .mount(&server)
            .await;

        let result = fetcher(Vec::new())
            .fetch(&format!("{}/manual.pdf", server.uri()), None)
            .await;
        assert!(matches!(result, Err(CatalogError::Unextractable { .. })));
    }

    #[tokio::test]
    async fn test_download_returns_bytes_and_disposition_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"drill.stp\"")
                    .set_body_raw(b"ISO-10303-21;".to_vec(), "application/step"),
            )
            .mount(&server)
            .await;

        let file = fetcher(Vec::new())
            .download(&format!("{}/files/42", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(file.bytes, b"ISO-10303-21;");
        assert_eq!(file.content_type, "application/step");
        assert_eq!(file.file_name.as_deref(), Some("drill.stp"));
    }

    #[tokio::test]
    async fn test_download_rejects_html_and_classifies_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manual.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<h1>Sign in</h1>", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let f = fetcher(Vec::new());

        let html = f.download(&format!("{}/manual.pdf", server.uri()), None).await;
        assert!(matches!(html, Err(CatalogError::Unextractable { .. })));

        let gone = f.download(&format!("{}/gone.pdf", server.uri()), None).await;
        assert!(matches!(gone, Err(CatalogError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_login_redirect_is_auth_required() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dealer/prices"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/login?next=/dealer/prices"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<form></form>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let f = fetcher(vec![private_profile(&server)]);
        let result = f
            .fetch(&format!("{}/dealer/prices", server.uri()), Some("acme"))
            .await;
        assert!(matches!(result, Err(CatalogError::AuthRequired { .. })));
    }

    #[tokio::test]
    async fn test_login_sets_session_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("username=bot"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "session=abc; Path=/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dealer/prices"))
            .and(header("cookie", "session=abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>prices</p>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let f = fetcher(vec![private_profile(&server)]);
        f.login("acme").await.unwrap();
        let page = f
            .fetch(&format!("{}/dealer/prices", server.uri()), Some("acme"))
            .await
            .unwrap();
        assert_eq!(page.html, "<p>prices</p>");
    }

    #[tokio::test]
    async fn test_login_without_credentials() {
        let f = fetcher(vec![BrandProfile::public("open", "Open", "open.example")]);
        assert!(matches!(
            f.login("open").await,
            Err(CatalogError::CredentialUnavailable(_))
        ));
        assert!(matches!(
            f.login("unknown").await,
            Err(CatalogError::ProfileNotFound(_))
        ));
    }
}
