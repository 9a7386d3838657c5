//! Crawl counters and index statistics
//!
//! This module provides the live counters updated while a crawl runs and
//! the statistics read back from the index once it has finished.

use crate::storage::{SqliteIndex, StorageResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every worker of a crawl
#[derive(Debug, Default)]
pub struct CrawlStats {
    search_pages: AtomicU64,
    detail_pages: AtomicU64,
    images_indexed: AtomicU64,
    dockerfiles_indexed: AtomicU64,
    empty_dockerfiles: AtomicU64,
    transient_failures: AtomicU64,
    malformed_responses: AtomicU64,
    persistence_failures: AtomicU64,
}

impl CrawlStats {
    pub fn record_search_page(&self) {
        self.search_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detail_page(&self) {
        self.detail_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_images_indexed(&self, count: u64) {
        self.images_indexed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_dockerfile_indexed(&self) {
        self.dockerfiles_indexed.fetch_add(1, Ordering::Relaxed);
    }

    /// A detail page parsed but carried no usable Dockerfile text
    pub fn record_empty_dockerfile(&self) {
        self.empty_dockerfiles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transient_failure(&self) {
        self.transient_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_response(&self) {
        self.malformed_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            search_pages: self.search_pages.load(Ordering::Relaxed),
            detail_pages: self.detail_pages.load(Ordering::Relaxed),
            images_indexed: self.images_indexed.load(Ordering::Relaxed),
            dockerfiles_indexed: self.dockerfiles_indexed.load(Ordering::Relaxed),
            empty_dockerfiles: self.empty_dockerfiles.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            malformed_responses: self.malformed_responses.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CrawlStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub search_pages: u64,
    pub detail_pages: u64,
    pub images_indexed: u64,
    pub dockerfiles_indexed: u64,
    pub empty_dockerfiles: u64,
    pub transient_failures: u64,
    pub malformed_responses: u64,
    pub persistence_failures: u64,
}

impl StatsSnapshot {
    /// Tasks that ended without their data reaching the index
    pub fn failures(&self) -> u64 {
        self.transient_failures + self.malformed_responses + self.persistence_failures
    }
}

/// What the index holds after a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStatistics {
    /// Every key in the index
    pub total_keys: u64,

    /// Keys holding Dockerfile text
    pub dockerfiles: u64,

    /// Images indexed without a Dockerfile
    pub images_without_dockerfile: u64,
}

impl IndexStatistics {
    /// Image keys, with or without a Dockerfile
    pub fn images(&self) -> u64 {
        self.total_keys.saturating_sub(self.dockerfiles)
    }
}

/// Loads statistics from the index
///
/// # Arguments
///
/// * `index` - The index to scan
///
/// # Returns
///
/// * `Ok(IndexStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query the index
pub fn load_statistics(index: &SqliteIndex) -> StorageResult<IndexStatistics> {
    index.view(|txn| {
        Ok(IndexStatistics {
            total_keys: txn.count_keys()?,
            dockerfiles: txn.count_dockerfiles()?,
            images_without_dockerfile: txn.count_images_without_dockerfile()?,
        })
    })
}

/// Prints index statistics to stdout
pub fn print_statistics(stats: &IndexStatistics) {
    println!("=== Index Statistics ===\n");
    println!("  Total keys: {}", stats.total_keys);
    println!("  Images: {}", stats.images());
    println!("  Dockerfiles: {}", stats.dockerfiles);
    println!(
        "  Images without dockerfile: {}",
        stats.images_without_dockerfile
    );

    let coverage = if stats.images() > 0 {
        (stats.dockerfiles as f64 / stats.images() as f64) * 100.0
    } else {
        0.0
    };
    println!("\nDockerfile coverage: {:.1}%", coverage);
}
