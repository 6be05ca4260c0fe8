use crate::config::types::{
    Config, CrawlerConfig, ProfileEntry, StorageConfig, TaxonomyConfig, UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_taxonomy_config(&config.taxonomy)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_profiles(&config.profiles)?;
    Ok(())
}

/// Validates job execution settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_pool_size < 1 || config.worker_pool_size > 32 {
        return Err(ConfigError::Validation(format!(
            "worker_pool_size must be between 1 and 32, got {}",
            config.worker_pool_size
        )));
    }

    if config.max_fetch_attempts < 1 || config.max_fetch_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_fetch_attempts must be between 1 and 10, got {}",
            config.max_fetch_attempts
        )));
    }

    if config.progress_channel_capacity < 1 {
        return Err(ConfigError::Validation(
            "progress_channel_capacity must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

fn validate_taxonomy_config(config: &TaxonomyConfig) -> Result<(), ConfigError> {
    if config.max_depth < 1 || config.max_depth > 10 {
        return Err(ConfigError::Validation(format!(
            "taxonomy max_depth must be between 1 and 10, got {}",
            config.max_depth
        )));
    }

    if config.shallow_candidate_cap < 1 {
        return Err(ConfigError::Validation(
            "shallow_candidate_cap must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    if config.asset_dir.is_empty() {
        return Err(ConfigError::Validation("asset_dir cannot be empty".to_string()));
    }
    Ok(())
}

/// Validates brand profile entries
fn validate_profiles(profiles: &[ProfileEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for profile in profiles {
        if profile.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "profile id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(profile.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate profile id '{}'",
                profile.id
            )));
        }

        if profile.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "profile '{}' must have a name",
                profile.id
            )));
        }

        validate_domain_root(&profile.domain_root)?;

        if profile.auth_required && profile.credential_id.is_none() {
            return Err(ConfigError::Validation(format!(
                "profile '{}' requires login but has no credential-id",
                profile.id
            )));
        }

        if let Some(login_url) = &profile.login_url {
            Url::parse(login_url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid login-url '{}': {}", login_url, e))
            })?;
        }
    }

    Ok(())
}

/// Validates a bare host name such as "acme.example"
fn validate_domain_root(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::Validation(
            "domain-root cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':')
    {
        return Err(ConfigError::Validation(format!(
            "domain-root '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(ConfigError::Validation(format!(
            "domain-root '{}' is not a valid host",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
