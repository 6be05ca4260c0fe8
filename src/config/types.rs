use crate::profile::RawExtractionRules;
use serde::Deserialize;

/// Main configuration structure for Catalog-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default, rename = "profile")]
    pub profiles: Vec<ProfileEntry>,
}

/// Job execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of page fetches allowed in flight across all jobs
    #[serde(rename = "worker-pool-size")]
    pub worker_pool_size: u32,

    /// Attempts per entry URL before it is recorded as an error
    #[serde(rename = "max-fetch-attempts")]
    pub max_fetch_attempts: u32,

    /// Base delay for exponential backoff between attempts (milliseconds)
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Time a stopped job gets to finish its current fetch (milliseconds)
    #[serde(rename = "stop-grace-period-ms")]
    pub stop_grace_period_ms: u64,

    /// Capacity of the progress broadcast channel
    #[serde(
        rename = "progress-channel-capacity",
        default = "default_progress_capacity"
    )]
    pub progress_channel_capacity: usize,

    /// Whole-request timeout for page fetches (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_progress_capacity() -> usize {
    256
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            max_fetch_attempts: 3,
            retry_backoff_ms: 500,
            stop_grace_period_ms: 5000,
            progress_channel_capacity: default_progress_capacity(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Taxonomy scanner limits
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyConfig {
    /// Hard recursion cap for deep scans
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Maximum number of root links visited by a shallow scan
    #[serde(rename = "shallow-candidate-cap")]
    pub shallow_candidate_cap: usize,

    /// Delay between page fetches during a scan (milliseconds)
    #[serde(rename = "politeness-delay-ms")]
    pub politeness_delay_ms: u64,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            shallow_candidate_cap: 40,
            politeness_delay_ms: 500,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory downloaded product files are written to, one folder per profile
    #[serde(rename = "asset-dir", default = "default_asset_dir")]
    pub asset_dir: String,
}

fn default_asset_dir() -> String {
    "./assets".to_string()
}

/// A brand profile declared in the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileEntry {
    pub id: String,

    pub name: String,

    /// Host the brand's catalog lives on (e.g. "acme.example")
    #[serde(rename = "domain-root")]
    pub domain_root: String,

    #[serde(rename = "auth-required", default)]
    pub auth_required: bool,

    #[serde(rename = "credential-id", default)]
    pub credential_id: Option<String>,

    /// Form endpoint used by the login flow
    #[serde(rename = "login-url", default)]
    pub login_url: Option<String>,

    /// Pages only render their content with JavaScript (see `catalog-crawl check-site`)
    #[serde(rename = "requires-rendering", default)]
    pub requires_rendering: bool,

    /// Extraction rules in any of the historical shapes
    #[serde(rename = "extraction-rules", default)]
    pub extraction_rules: Option<RawExtractionRules>,
}
