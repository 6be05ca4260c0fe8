//! Credential lookup for authenticated crawling
//!
//! Secrets live in an external store; this crate only asks for them at
//! login time and never persists or logs them.

use crate::{CatalogError, Result};
use std::collections::HashMap;
use std::fmt;

/// Username/password pair revealed for a login flow
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Access to stored credentials by id
pub trait CredentialStore: Send + Sync {
    fn reveal(&self, credential_id: &str) -> Result<Credential>;
}

/// Resolves credentials from environment variables
///
/// Credential `acme-login` is read from `CATALOG_CRAWL_CRED_ACME_LOGIN_USERNAME`
/// and `CATALOG_CRAWL_CRED_ACME_LOGIN_PASSWORD`.
#[derive(Debug, Default, Clone)]
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    fn var_prefix(credential_id: &str) -> String {
        let id: String = credential_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("CATALOG_CRAWL_CRED_{}", id)
    }
}

impl CredentialStore for EnvCredentialStore {
    fn reveal(&self, credential_id: &str) -> Result<Credential> {
        let prefix = Self::var_prefix(credential_id);
        let username = std::env::var(format!("{}_USERNAME", prefix))
            .map_err(|_| CatalogError::CredentialUnavailable(credential_id.to_string()))?;
        let password = std::env::var(format!("{}_PASSWORD", prefix))
            .map_err(|_| CatalogError::CredentialUnavailable(credential_id.to_string()))?;
        Ok(Credential { username, password })
    }
}

/// In-memory credentials, mainly for tests and embedding
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialStore {
    credentials: HashMap<String, Credential>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, credential_id: &str, username: &str, password: &str) -> Self {
        self.credentials.insert(
            credential_id.to_string(),
            Credential {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        self
    }
}

impl CredentialStore for StaticCredentialStore {
    fn reveal(&self, credential_id: &str) -> Result<Credential> {
        self.credentials
            .get(credential_id)
            .cloned()
            .ok_or_else(|| CatalogError::CredentialUnavailable(credential_id.to_string()))
    }
}
