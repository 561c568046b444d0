//! # news_crawler
//!
//! A polite, sequential crawler for a single news site. It walks category
//! listing pages, extracts article summaries, fetches each new article,
//! rewrites its body for off-site display and stores it once per source URL.
//!
//! ## Pipeline
//!
//! 1. **Fetching** ([`fetcher`]): HTTP GET with browser headers and linear backoff retry
//! 2. **Listing** ([`scrapers::listing`]): category page to [`models::ArticleSummary`] values
//! 3. **Content** ([`scrapers::article`]): article page to sanitized HTML
//! 4. **Dedup and persist** ([`store`]): insert keyed on the source URL
//! 5. **Orchestration** ([`crawler`]): categories, pages, delays, cancellation, progress
//!
//! ## Example
//!
//! ```ignore
//! let config = CrawlConfig::load("crawler.yaml")?;
//! let site_root = config.site_root_url()?;
//! let fetcher = RetryFetch::from_config(HttpFetcher::new(&config.fetch, &site_root)?, &config.fetch);
//! let store = JsonFileStore::open("./data/articles.jsonl").await?;
//! let report = Crawler::new(config, fetcher, store).run().await?;
//! println!("{} articles discovered", report.articles_discovered().len());
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod scrapers;
pub mod store;
pub mod utils;

pub use config::{CategorySpec, CrawlConfig, DelayConfig, FetchConfig};
pub use crawler::{CrawlProgress, CrawlReport, CrawlState, CrawlSummary, Crawler};
pub use error::{ConfigError, CrawlError, FetchError, FetchErrorKind, StoreError};
pub use fetcher::{FetchKind, FetchedImage, FetchedPage, HttpFetcher, PageSource, RetryFetch};
pub use models::{Article, ArticleSummary, FetchAttempt};
pub use store::{ArticleStore, JsonFileStore, MemoryStore};
