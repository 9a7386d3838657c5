use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Hub-Indexer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub endpoints: EndpointsConfig,
    pub storage: StorageConfig,
    pub seeds: SeedsConfig,
    pub proxy: ProxyConfig,
    pub cache: CacheConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent workers draining the frontier
    pub workers: usize,

    /// Maximum number of pending tasks held by the frontier
    pub queue_capacity: usize,

    /// Whole-request timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Connection establishment timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// How many times a transient fetch failure is retried
    pub retries: u32,

    /// Delay between retries (milliseconds)
    pub retry_delay_ms: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 1_500_000,
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            retries: 1,
            retry_delay_ms: 2_000,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Remote registry endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EndpointsConfig {
    /// Search endpoint, queried with `?q=<keyword>&n=<page-size>[&page=<n>]`
    pub search_url: String,

    /// Repository endpoint, queried with `/<image>/dockerfile/`
    pub detail_url: String,

    /// Number of results requested per search page
    pub page_size: u32,

    /// Highest search page crawled per keyword, whatever the API reports
    pub max_pages: u32,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            search_url: "https://index.docker.io/v1/search".to_string(),
            detail_url: "https://hub.docker.com/v2/repositories".to_string(),
            page_size: 1000,
            max_pages: 100,
        }
    }
}

/// Index storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the index database
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/hub-index".to_string(),
        }
    }
}

/// Seed keyword source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeedsConfig {
    /// JSON file of the form `{"keywords": [...]}`
    pub path: String,
}

impl Default for SeedsConfig {
    fn default() -> Self {
        Self {
            path: "search-terms.json".to_string(),
        }
    }
}

/// Anonymizing proxy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route every request through one of `addresses`
    pub enabled: bool,

    /// Proxies rotated round-robin, one per request
    pub addresses: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addresses: vec!["socks5://127.0.0.1:9050".to_string()],
        }
    }
}

/// On-disk response cache
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve repeated URLs from `dir` instead of the network
    pub enabled: bool,

    /// Directory holding one file per cached response
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "./data/cache".to_string(),
        }
    }
}
