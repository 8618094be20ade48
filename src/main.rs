//! Nova crawler main entry point
//!
//! This is the command-line interface for running crawl jobs and the
//! recrawl scheduler against a local SQLite index.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use nova_crawler::config::{load_config_with_hash, Config};
use nova_crawler::storage::{open_store, SqliteStore};
use nova_crawler::url::origin_of;
use nova_crawler::{normalize_url, CrawlManager, JobState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Nova crawler: a polite crawl orchestration engine
///
/// Crawls seed sites and their sitemaps while respecting robots.txt and
/// per-domain rate limits, storing extracted page content for indexing.
#[derive(Parser, Debug)]
#[command(name = "nova-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A polite crawl orchestration engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URL (repeatable); overrides the seeds in the configuration
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Override the configured maximum link depth
    #[arg(long)]
    max_depth: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["schedule", "stats"])]
    dry_run: bool,

    /// Run the recrawl scheduler until interrupted
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    schedule: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "schedule"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if !cli.seeds.is_empty() {
        config.seeds = cli.seeds.clone();
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.schedule {
        handle_schedule(config).await?;
    } else {
        handle_crawl(config, cli.max_depth).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("nova_crawler=info,warn"),
            1 => EnvFilter::new("nova_crawler=debug,info"),
            2 => EnvFilter::new("nova_crawler=trace,debug"),
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

fn open_configured_store(config: &Config) -> anyhow::Result<Arc<SqliteStore>> {
    let path = Path::new(&config.storage.database_path);
    let interval = Duration::from_secs(config.recrawl.default_interval_secs);
    let store = open_store(path, interval)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Nova Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers per job: {}", config.crawler.workers);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Min delay per domain: {}ms", config.crawler.min_delay_ms);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        match normalize_url(seed) {
            Ok(url) => println!("  - {}", url),
            Err(e) => println!("  - {} (invalid: {})", seed, e),
        }
    }

    println!("\nPriority Patterns ({}):", config.prioritizer.patterns.len());
    for entry in &config.prioritizer.patterns {
        println!("  - {} => {}", entry.pattern, entry.weight);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let store = open_configured_store(config)?;

    println!("Database: {}\n", config.storage.database_path);
    println!("Indexed pages: {}", store.count_pages()?);

    Ok(())
}

/// Handles the default mode: runs one crawl job to completion
async fn handle_crawl(config: Config, max_depth: Option<u32>) -> anyhow::Result<()> {
    if config.seeds.is_empty() {
        anyhow::bail!("no seed URLs given (use --seed or the `seeds` config key)");
    }

    let store = open_configured_store(&config)?;
    let seeds = config.seeds.clone();
    let manager = CrawlManager::new(config, store.clone(), store)?;

    let job_id = manager.start_crawling(&seeds, max_depth).await?;

    let interrupted = {
        let wait = manager.wait(job_id);
        tokio::pin!(wait);
        tokio::select! {
            status = &mut wait => {
                status?;
                false
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling crawl job {}", job_id);
                manager.cancel_crawling(job_id);
                true
            }
        }
    };

    let status = manager.wait(job_id).await?;
    if interrupted {
        tracing::info!("Crawl job {} stopped after cancellation", job_id);
    }

    println!("\n=== Crawl Job {} ===", status.job_id);
    println!("Status: {}", status.status);
    println!("Pages crawled: {}", status.pages_crawled);
    println!("Errors: {}", status.errors.len());
    for error in status.errors.iter().take(20) {
        println!("  - {}", error);
    }

    if status.status == JobState::Failed {
        anyhow::bail!("crawl job {} failed", job_id);
    }

    Ok(())
}

/// Handles the --schedule mode: registers seed domains and runs recrawls
async fn handle_schedule(config: Config) -> anyhow::Result<()> {
    let store = open_configured_store(&config)?;
    let interval = Duration::from_secs(config.recrawl.default_interval_secs);

    for seed in &config.seeds {
        let url = match normalize_url(seed) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Skipping invalid seed {}: {}", seed, e);
                continue;
            }
        };
        // The origin keeps the seed's scheme for later recrawls
        if let Some(origin) = origin_of(&url) {
            store.register_domain(&origin, interval, Utc::now())?;
        }
    }

    let manager = CrawlManager::new(config, store.clone(), store)?;
    let shutdown = CancellationToken::new();

    let signal = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping scheduler");
            }
            shutdown.cancel();
        })
    };

    manager.schedule_recrawls(shutdown).await;
    manager.shutdown().await;
    signal.abort();

    Ok(())
}
