use crate::config::ProfileEntry;
use crate::profile::rules::ExtractionRules;
use serde::{Deserialize, Serialize};

/// Identity of a scrape target and how to crawl it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandProfile {
    pub id: String,
    pub name: String,
    pub domain_root: String,
    pub auth_required: bool,
    pub credential_id: Option<String>,
    pub login_url: Option<String>,
    /// Catalog pages need a JavaScript-capable fetcher
    #[serde(default)]
    pub requires_rendering: bool,
    pub rules: ExtractionRules,
}

impl BrandProfile {
    /// A profile with no login and empty rules
    pub fn public(id: &str, name: &str, domain_root: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            domain_root: domain_root.to_string(),
            auth_required: false,
            credential_id: None,
            login_url: None,
            requires_rendering: false,
            rules: ExtractionRules::default(),
        }
    }
}

impl From<&ProfileEntry> for BrandProfile {
    fn from(entry: &ProfileEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            domain_root: entry.domain_root.clone(),
            auth_required: entry.auth_required,
            credential_id: entry.credential_id.clone(),
            login_url: entry.login_url.clone(),
            requires_rendering: entry.requires_rendering,
            rules: entry
                .extraction_rules
                .clone()
                .map(|raw| raw.migrate())
                .unwrap_or_default(),
        }
    }
}
