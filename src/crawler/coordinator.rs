//! Crawler coordinator - main crawl orchestration logic
//!
//! This module wires the crawl together:
//! - Opening the index and building the transport
//! - Seeding the frontier with one search task per keyword
//! - Draining the frontier through the response router
//! - Handling interrupts and closing the index

use crate::config::Config;
use crate::crawler::fetcher::{
    CachingTransport, HttpTransport, ProxySelector, RoundRobinProxies, Transport,
};
use crate::crawler::frontier::Frontier;
use crate::crawler::router::Router;
use crate::crawler::seeds::load_seeds;
use crate::crawler::task::Endpoints;
use crate::output::{load_statistics, CrawlReport, CrawlStats};
use crate::storage::{open_index, SqliteIndex};
use crate::IndexerError;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often progress is logged while the crawl runs
const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    endpoints: Endpoints,
    index: Arc<SqliteIndex>,
    frontier: Arc<Frontier>,
    stats: Arc<CrawlStats>,
    seeds: usize,
}

impl Coordinator {
    /// Creates a coordinator that fetches over HTTP
    ///
    /// With `proxy.enabled`, every request goes through the configured
    /// proxies in rotation. With `cache.enabled`, responses already in the
    /// cache directory are not fetched again.
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Index opened and transport built
    /// * `Err(IndexerError)` - Startup failed; nothing was fetched
    pub fn new(config: Config) -> Result<Self, IndexerError> {
        let transport: Arc<dyn Transport> = if config.proxy.enabled {
            let proxies = RoundRobinProxies::from_config(&config.proxy)?;
            tracing::info!(
                "Routing requests through {} proxies",
                proxies.candidates().len()
            );
            Arc::new(HttpTransport::with_proxies(&config.crawler, Arc::new(proxies))?)
        } else {
            Arc::new(HttpTransport::new(&config.crawler)?)
        };

        let transport: Arc<dyn Transport> = if config.cache.enabled {
            tracing::info!("Caching responses in {}", config.cache.dir);
            Arc::new(
                CachingTransport::new(transport, &config.cache.dir).map_err(|source| {
                    IndexerError::Cache {
                        path: config.cache.dir.clone(),
                        source,
                    }
                })?,
            )
        } else {
            transport
        };

        Self::with_transport(config, transport)
    }

    /// Creates a coordinator around an existing transport
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self, IndexerError> {
        let endpoints = Endpoints::from_config(&config.endpoints)?;

        let index = open_index(Path::new(&config.storage.path))?;
        tracing::info!("Opened index at {}", config.storage.path);

        let frontier = Frontier::new(config.crawler.queue_capacity, transport)
            .with_retries(config.crawler.retries, config.crawler.retry_delay());

        Ok(Self {
            config,
            endpoints,
            index: Arc::new(index),
            frontier: Arc::new(frontier),
            stats: Arc::new(CrawlStats::default()),
            seeds: 0,
        })
    }

    /// Enqueues page 1 of every keyword, in order
    ///
    /// # Returns
    ///
    /// The number of keywords newly accepted; repeats are ignored and a
    /// full queue drops the rest with a warning.
    pub fn seed(&mut self, keywords: &[String]) -> usize {
        let mut accepted = 0;

        for keyword in keywords {
            match self.frontier.enqueue(self.endpoints.search_page(keyword, 1)) {
                Ok(true) => accepted += 1,
                Ok(false) => tracing::debug!("Seed keyword '{}' already queued", keyword),
                Err(e) => tracing::warn!("{}", e),
            }
        }

        self.seeds += accepted;
        tracing::info!("Seeded frontier with {} keywords", accepted);
        accepted
    }

    /// Runs the crawl until the frontier drains or Ctrl-C is pressed
    ///
    /// Per-task failures never end the crawl; they are counted in the
    /// returned report. The index is closed before returning.
    pub async fn run(self) -> Result<CrawlReport, IndexerError> {
        let Coordinator {
            config,
            endpoints,
            index,
            frontier,
            stats,
            seeds,
        } = self;

        tracing::info!(
            "Starting crawl with {} workers ({} tasks queued)",
            config.crawler.workers,
            frontier.pending()
        );
        let start_time = Instant::now();

        let shutdown = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, finishing in-flight tasks");
                    frontier.close();
                }
            })
        };

        let progress = {
            let frontier = Arc::clone(&frontier);
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let snapshot = stats.snapshot();
                    tracing::info!(
                        "Progress: {} images, {} dockerfiles, {} queued, {} in flight, {} failures",
                        snapshot.images_indexed,
                        snapshot.dockerfiles_indexed,
                        frontier.pending(),
                        frontier.in_flight(),
                        snapshot.failures()
                    );
                }
            })
        };

        let router = Router::new(index.clone(), endpoints, Arc::clone(&stats));
        let frontier_report = frontier
            .run(config.crawler.workers, move |task, outcome| {
                router.handle(task, outcome)
            })
            .await;

        shutdown.abort();
        progress.abort();

        let interrupted = frontier.is_closed();
        let elapsed = start_time.elapsed();

        if interrupted {
            tracing::warn!(
                "Crawl interrupted after {:.1}s, {} tasks abandoned",
                elapsed.as_secs_f64(),
                frontier_report.abandoned
            );
        } else {
            tracing::info!(
                "Frontier drained after {:.1}s, {} tasks completed",
                elapsed.as_secs_f64(),
                frontier_report.completed
            );
        }

        let index_stats = match load_statistics(&index) {
            Ok(index_stats) => Some(index_stats),
            Err(e) => {
                tracing::warn!("Failed to read index statistics: {}", e);
                None
            }
        };

        match Arc::try_unwrap(index) {
            Ok(index) => index.close()?,
            Err(shared) => shared.flush()?,
        }

        Ok(CrawlReport {
            seeds,
            counters: stats.snapshot(),
            frontier: frontier_report,
            interrupted,
            elapsed,
            index: index_stats,
        })
    }
}

/// Runs a complete crawl operation
///
/// Loads the seed keywords, opens the index, and crawls until the frontier
/// drains. Seed, storage, and client failures are fatal and surface before
/// any request is made.
///
/// # Example
///
/// ```no_run
/// use hub_indexer::config::load_config;
/// use hub_indexer::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let report = run_crawl(config).await?;
/// println!("{} dockerfiles indexed", report.counters.dockerfiles_indexed);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config) -> Result<CrawlReport, IndexerError> {
    let keywords = load_seeds(Path::new(&config.seeds.path))?;

    let mut coordinator = Coordinator::new(config)?;
    coordinator.seed(&keywords);
    coordinator.run().await
}
