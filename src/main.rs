//! # news_crawler
//!
//! Runs one crawl over the configured news categories and stores every new
//! article in a JSON Lines file, keyed on its source URL so reruns only add what
//! is new.
//!
//! ## Usage
//!
//! ```sh
//! news_crawler --config crawler.yaml --store ./data/articles.jsonl
//! ```
//!
//! Prints a JSON summary of the run on stdout. Ctrl-C stops the run after
//! the article in flight.

use clap::Parser;
use news_crawler::{
    ArticleStore, CrawlConfig, CrawlError, CrawlReport, Crawler, HttpFetcher, JsonFileStore,
    MemoryStore, PageSource, RetryFetch,
};
use std::error::Error;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;

use cli::Cli;
use news_crawler::utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("news_crawler starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.store, ?args.pages, dry_run = args.dry_run, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = match &args.config {
        Some(path) => CrawlConfig::load(path)?,
        None => {
            info!("No config file given; using defaults");
            CrawlConfig::default()
        }
    };
    if let Some(pages) = args.pages {
        config.page_depth = pages;
    }
    config.retain_categories(&args.categories);
    if config.categories.is_empty() {
        warn!(filter = ?args.categories, "Category filter matched nothing");
    }

    let site_root = config.site_root_url()?;
    let fetcher = RetryFetch::from_config(HttpFetcher::new(&config.fetch, &site_root)?, &config.fetch);

    // ---- Cancellation ----
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current article and stopping");
            on_signal.cancel();
        }
    });

    // ---- Crawl ----
    let report = if args.dry_run {
        info!("Dry run; articles are kept in memory only");
        crawl(config, fetcher, MemoryStore::new(), cancel).await?
    } else {
        let dir = args
            .store
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Store directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
        let store = JsonFileStore::open(&args.store).await?;
        crawl(config, fetcher, store, cancel).await?
    };

    println!("{}", serde_json::to_string_pretty(&report.summary())?);

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn crawl<F, S>(
    config: CrawlConfig,
    fetcher: F,
    store: S,
    cancel: CancellationToken,
) -> Result<CrawlReport, CrawlError>
where
    F: PageSource,
    S: ArticleStore,
{
    Crawler::new(config, fetcher, store)
        .with_cancellation(cancel)
        .run()
        .await
}
