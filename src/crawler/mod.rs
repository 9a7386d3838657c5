//! Crawler module for registry search and Dockerfile retrieval
//!
//! This module contains the core crawling logic, including:
//! - Task identity and URL resolution
//! - HTTP fetching, optionally through rotating proxies and a response cache
//! - The bounded, deduplicating frontier and its worker pool
//! - Routing responses into index writes and follow-up tasks
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod router;
mod seeds;
mod task;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{
    build_http_client, CachingTransport, HttpTransport, ProxySelector, RoundRobinProxies, Transport,
};
pub use frontier::{Frontier, FrontierReport};
pub use parser::{
    clean_dockerfile, decode_entities, parse_dockerfile_page, parse_search_page, DockerfilePage,
    SearchResult, SearchResultsPage,
};
pub use router::{expand_pages, Routed, Router};
pub use seeds::load_seeds;
pub use task::{Endpoints, SearchTask, TaskKind, DEFAULT_MAX_PAGES};
