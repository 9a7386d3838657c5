//! Output module for crawl reports and index statistics
//!
//! This module handles:
//! - Live counters shared by the crawl workers
//! - The report returned when a crawl finishes
//! - Statistics read back from the index

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStats, IndexStatistics, StatsSnapshot};

use crate::crawler::FrontierReport;
use std::time::Duration;

/// Process exit status of a crawl stopped by an interrupt (128 + SIGINT)
pub const INTERRUPTED_EXIT_STATUS: u8 = 130;

/// Summary of one finished crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Seed keywords accepted into the frontier
    pub seeds: usize,

    /// Routing and persistence counters
    pub counters: StatsSnapshot,

    /// Queue-level counters
    pub frontier: FrontierReport,

    /// Whether the crawl was stopped before the frontier drained
    pub interrupted: bool,

    /// Wall-clock duration of the crawl
    pub elapsed: Duration,

    /// Index contents after the crawl; `None` if they could not be read
    pub index: Option<IndexStatistics>,
}

impl CrawlReport {
    /// Tasks that ended without their data reaching the index
    pub fn failures(&self) -> u64 {
        self.counters.failures()
    }

    /// Process exit status: zero once the frontier drained
    pub fn exit_status(&self) -> u8 {
        if self.interrupted {
            INTERRUPTED_EXIT_STATUS
        } else {
            0
        }
    }

    /// Fetched pages per second over the whole crawl
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frontier.completed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Prints a crawl report to stdout
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");

    println!("Overview:");
    println!("  Seed keywords: {}", report.seeds);
    println!(
        "  Tasks completed: {} in {:.1}s ({:.2}/sec)",
        report.frontier.completed,
        report.elapsed.as_secs_f64(),
        report.rate()
    );
    println!("  Search pages: {}", report.counters.search_pages);
    println!("  Detail pages: {}", report.counters.detail_pages);
    println!("  Images indexed: {}", report.counters.images_indexed);
    println!("  Dockerfiles indexed: {}", report.counters.dockerfiles_indexed);
    println!("  Empty dockerfiles: {}", report.counters.empty_dockerfiles);
    println!();

    println!("Frontier:");
    println!("  Duplicate tasks ignored: {}", report.frontier.duplicates);
    println!("  Tasks dropped: {}", report.frontier.dropped);
    if report.interrupted {
        println!("  Tasks abandoned on shutdown: {}", report.frontier.abandoned);
    }
    println!();

    if report.failures() > 0 {
        println!("Failures ({}):", report.failures());
        println!("  Transient: {}", report.counters.transient_failures);
        println!("  Malformed: {}", report.counters.malformed_responses);
        println!("  Persistence: {}", report.counters.persistence_failures);
        println!();
    }

    if let Some(index) = &report.index {
        print_statistics(index);
    }
}
