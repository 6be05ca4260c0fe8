//! Page fetching
//!
//! The orchestrator and the taxonomy scanner talk to the web only through
//! the [`PageFetcher`] trait. [`HttpFetcher`] is the reqwest-backed
//! implementation with a per-process cookie jar for authenticated sessions.
//! [`SessionFetcher`] layers the session gate, pool slots, retries and the
//! login retry on top of any fetcher.

mod http;
mod retry;
mod session;
mod site_check;

pub use http::{build_http_client, HttpFetcher};
pub use retry::retry_with_backoff;
pub use session::SessionFetcher;
pub use site_check::{check_site, requires_rendering, SiteCheck};

use crate::{CatalogError, Result};
use async_trait::async_trait;

/// A fetched HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,
    pub html: String,
}

/// A downloaded binary file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub final_url: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Name from the `Content-Disposition` header, when the server sent one
    pub file_name: Option<String>,
}

/// Capability to fetch HTML, optionally inside a brand profile's
/// authenticated session
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`
    ///
    /// Fails with `FetchFailed`, `Timeout`, `AuthRequired`, `NotFound`, or
    /// `Unextractable` (non-HTML body).
    async fn fetch(&self, url: &str, auth_profile: Option<&str>) -> Result<FetchedPage>;

    /// Runs the stored-credential login flow for a profile
    async fn login(&self, profile_id: &str) -> Result<()>;

    /// Downloads a linked file as raw bytes, with the same error
    /// classification as [`PageFetcher::fetch`]
    async fn download(&self, url: &str, _auth_profile: Option<&str>) -> Result<FetchedFile> {
        Err(CatalogError::Unextractable {
            url: url.to_string(),
            message: "this fetcher cannot download files".to_string(),
        })
    }
}
