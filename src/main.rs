//! Hub-Indexer main entry point
//!
//! This is the command-line interface for the Hub-Indexer registry crawler.

use anyhow::Context;
use clap::Parser;
use hub_indexer::config::{load_config, validate, Config};
use hub_indexer::crawler::run_crawl;
use hub_indexer::output::{load_statistics, print_report, print_statistics};
use hub_indexer::storage::open_index;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Hub-Indexer: a container registry search crawler
///
/// Hub-Indexer searches a registry for every seed keyword, walks all result
/// pages, fetches the Dockerfile behind each image, and stores both in a
/// durable key-value index.
#[derive(Parser, Debug)]
#[command(name = "hub-indexer")]
#[command(version = "1.0.0")]
#[command(about = "A container registry search crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply without one)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the index
    #[arg(short, long, value_name = "DIR")]
    storage: Option<PathBuf>,

    /// JSON file with the seed keywords
    #[arg(long, value_name = "FILE")]
    seeds: Option<PathBuf>,

    /// Route every request through the anonymizing proxies
    #[arg(long)]
    tor: bool,

    /// Cache responses in this directory and reuse them on later runs
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Show statistics from the index and exit
    #[arg(long)]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = build_config(&cli)?;

    if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_crawl(config, cli.quiet).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("hub_indexer=info,warn"),
            1 => EnvFilter::new("hub_indexer=debug,info"),
            2 => EnvFilter::new("hub_indexer=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file, if any, and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(storage) = &cli.storage {
        config.storage.path = storage.display().to_string();
    }
    if let Some(seeds) = &cli.seeds {
        config.seeds.path = seeds.display().to_string();
    }
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if cli.tor {
        config.proxy.enabled = true;
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache.enabled = true;
        config.cache.dir = dir.display().to_string();
    }

    validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// Handles the --stats mode: shows statistics from the index
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Index: {}\n", config.storage.path);

    let index = open_index(Path::new(&config.storage.path))
        .with_context(|| format!("Failed to open index at {}", config.storage.path))?;
    let stats = load_statistics(&index).context("Failed to read index statistics")?;

    print_statistics(&stats);
    Ok(())
}

/// Handles the main crawl operation
///
/// An interrupted crawl exits non-zero even though everything it fetched
/// was indexed.
async fn handle_crawl(config: Config, quiet: bool) -> anyhow::Result<ExitCode> {
    tracing::info!(
        "Storage: {}, seeds: {}, proxy: {}",
        config.storage.path,
        config.seeds.path,
        if config.proxy.enabled { "on" } else { "off" }
    );

    match run_crawl(config).await {
        Ok(report) => {
            tracing::info!(
                "Crawl completed: {} images, {} dockerfiles, {} failures",
                report.counters.images_indexed,
                report.counters.dockerfiles_indexed,
                report.failures()
            );
            if !quiet {
                print_report(&report);
            }
            if report.interrupted {
                tracing::warn!("Crawl stopped before the frontier drained");
            }
            Ok(ExitCode::from(report.exit_status()))
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
