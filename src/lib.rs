//! Hub-Indexer: a registry search crawler
//!
//! This crate crawls a container registry's search API, follows every result
//! to its Dockerfile, and persists both into a durable key-value index that
//! other tools can scan.

pub mod config;
pub mod crawler;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Hub-Indexer operations
///
/// Every variant that reaches `main` is a startup failure; per-task failures
/// are contained inside the crawl and only show up in the crawl report.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid endpoint URL: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Failed to open response cache {path}: {source}")]
    Cache {
        path: String,
        source: std::io::Error,
    },
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

/// Errors raised while loading the seed keywords
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse seed file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Seed file {0} contains no keywords")]
    Empty(String),
}

/// Errors produced by a single fetch
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network, timeout or proxy failure; the request may succeed later
    #[error("Transient fetch failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// The server answered, but not with something usable
    #[error("Malformed response from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl FetchError {
    /// Returns true if retrying the request could help
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The URL the failed request was sent to
    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. } | Self::Malformed { url, .. } => url,
        }
    }
}

/// Errors produced while routing a fetched body
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Malformed {kind} body from {url}: {source}")]
    Malformed {
        kind: &'static str,
        url: String,
        source: serde_json::Error,
    },
}

/// Errors returned by the frontier when a task cannot be accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrontierError {
    #[error("Frontier is full ({capacity} pending tasks), dropping {url}")]
    QueueFull { capacity: usize, url: String },

    #[error("Frontier is closed, dropping {url}")]
    Closed { url: String },
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Coordinator, SearchTask, TaskKind};
pub use output::CrawlReport;
pub use storage::{DockerfileRecord, ImageRecord, SqliteIndex};
