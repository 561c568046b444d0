//! Command-line interface definitions for the news crawler.
//!
//! All options can be provided via command-line flags or environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for one crawl run.
///
/// Flags override the matching settings of the YAML configuration.
///
/// # Examples
///
/// ```sh
/// # Crawl every default category into ./data/articles.jsonl
/// news_crawler
///
/// # Two pages of sports only, with a custom config
/// news_crawler -c crawler.yaml --pages 2 --category "Thể thao"
///
/// # Crawl without persisting anything
/// news_crawler --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML crawl configuration
    #[arg(short, long, env = "NEWS_CRAWLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON Lines file articles are stored in
    #[arg(short, long, env = "NEWS_CRAWLER_STORE", default_value = "./data/articles.jsonl")]
    pub store: PathBuf,

    /// Listing pages to crawl per category
    #[arg(short, long)]
    pub pages: Option<usize>,

    /// Only crawl these categories (by name or URL slug); repeatable
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Keep articles in memory instead of writing the store
    #[arg(long)]
    pub dry_run: bool,
}
