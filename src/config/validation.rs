use crate::config::types::{CacheConfig, Config, CrawlerConfig, EndpointsConfig, ProxyConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_endpoints(&config.endpoints)?;
    validate_proxy_config(&config.proxy)?;
    validate_cache_config(&config.cache)?;

    if config.storage.path.is_empty() {
        return Err(ConfigError::Validation(
            "storage path cannot be empty".to_string(),
        ));
    }

    if config.seeds.path.is_empty() {
        return Err(ConfigError::Validation(
            "seeds path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(
            "queue-capacity must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates endpoint URLs
fn validate_endpoints(config: &EndpointsConfig) -> Result<(), ConfigError> {
    validate_http_url("search-url", &config.search_url)?;
    validate_http_url("detail-url", &config.detail_url)?;

    if config.page_size < 1 {
        return Err(ConfigError::Validation(
            "page-size must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy configuration
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.enabled && config.addresses.is_empty() {
        return Err(ConfigError::Validation(
            "proxy is enabled but no addresses are configured".to_string(),
        ));
    }

    for address in &config.addresses {
        let url = Url::parse(address)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", address, e)))?;

        if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
            return Err(ConfigError::InvalidUrl(format!(
                "Unsupported proxy scheme '{}' in '{}'",
                url.scheme(),
                address
            )));
        }
    }

    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.enabled && config.dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "cache is enabled but dir is empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name, value
        )));
    }

    if url.query().is_some() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must not carry a query string, got '{}'",
            name, value
        )));
    }

    Ok(())
}
