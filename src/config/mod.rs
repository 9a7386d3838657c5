//! Configuration module for Hub-Indexer
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so a crawl can run without any file at all.
//!
//! # Example
//!
//! ```no_run
//! use hub_indexer::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("hub-indexer.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, Config, CrawlerConfig, EndpointsConfig, ProxyConfig, SeedsConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{load_config, parse_config};
pub use validation::validate;
