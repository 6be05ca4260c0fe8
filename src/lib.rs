//! Catalog-Crawl: a catalog crawl and extraction engine
//!
//! This crate turns brand product websites into a structured, deduplicated
//! product catalog. It learns URL templates from a single example, discovers
//! category trees, extracts product records with layered heuristics, and runs
//! long-lived crawl jobs with pause/resume/stop/commit control. Files linked
//! from committed products can be downloaded into a local asset folder.

pub mod assets;
pub mod config;
pub mod extract;
pub mod fetcher;
pub mod jobs;
pub mod pattern;
pub mod profile;
pub mod storage;
pub mod taxonomy;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Crawl operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed for {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Page not found: {url}")]
    NotFound { url: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Unextractable page {url}: {message}")]
    Unextractable { url: String, message: String },

    #[error("No value of the sample row occurs in the example URL")]
    NoTokenMatch,

    #[error("Pattern has no code placeholder: {template}")]
    PatternNotParametrized { template: String },

    #[error("Commit failed for job {job_id}: {message}")]
    CommitFailed { job_id: String, message: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: jobs::JobStatus,
        to: jobs::JobStatus,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Brand profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("Invalid extraction rules: {0}")]
    InvalidRules(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Returns true for failures worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::Timeout { .. })
    }

    /// HTTP-style status code passed through to callers of the upward surface
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoTokenMatch
            | Self::PatternNotParametrized { .. }
            | Self::InvalidRules(_)
            | Self::UrlError(_)
            | Self::UrlParse(_)
            | Self::Config(_) => 400,
            Self::AuthRequired { .. } | Self::CredentialUnavailable(_) => 401,
            Self::NotFound { .. } | Self::JobNotFound(_) | Self::ProfileNotFound(_) => 404,
            Self::InvalidTransition { .. } | Self::CommitFailed { .. } => 409,
            Self::Unextractable { .. } => 422,
            Self::FetchFailed { .. } | Self::Reqwest(_) => 502,
            Self::Timeout { .. } => 504,
            Self::Database(_) | Self::Storage(_) | Self::Json(_) | Self::Io(_) => 500,
        }
    }
}

impl From<storage::StorageError> for CatalogError {
    fn from(e: storage::StorageError) -> Self {
        use storage::StorageError;
        match e {
            StorageError::JobNotFound(id) => Self::JobNotFound(id),
            StorageError::ProfileNotFound(id) => Self::ProfileNotFound(id),
            StorageError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            other => Self::Storage(other),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Catalog-Crawl operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use extract::{classify, extract_product, PageClass, ProductRecord};
pub use jobs::{JobStatus, Orchestrator};
pub use pattern::{apply, detect, SampleRow, UrlPattern};
pub use taxonomy::{TaxonomyNode, TaxonomyScanner};
pub use url::canonicalize_url;
