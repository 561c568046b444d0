//! Crawl orchestration.
//!
//! A [`Crawler`] walks every configured category, page by page, and for each
//! listed article runs the dedup, fetch, extract and persist sequence.
//!
//! # Run Shape
//!
//! ```text
//! for category in categories:
//!     for page in 1..=page_depth:
//!         fetch listing -> extract summaries
//!         for summary in summaries:
//!             exists? -> skip
//!             fetch detail -> extract content -> insert
//!             sleep(article delay)
//!         sleep(page delay)
//!     sleep(category delay)
//! ```
//!
//! Only an invalid configuration fails a run. Page and article failures are
//! logged, counted in the [`CrawlReport`] and skipped.
//!
//! # Cancellation
//!
//! The run checks its [`CancellationToken`] between pages, between articles
//! and during every politeness sleep. A fetch already in flight completes.
//!
//! # Progress
//!
//! [`Crawler::subscribe`] hands out a `watch` receiver whose value is
//! replaced whenever the run changes state or a counter moves.

use crate::config::{CategorySpec, CrawlConfig};
use crate::error::{CrawlError, StoreError};
use crate::fetcher::{FetchKind, PageSource};
use crate::models::{Article, ArticleSummary};
use crate::scrapers::article::extract_content;
use crate::scrapers::listing::extract_listing;
use crate::store::ArticleStore;
use crate::utils::truncate_for_log;
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum CrawlState {
    #[default]
    Idle,
    RunningCategory {
        category: usize,
    },
    RunningPage {
        category: usize,
        page: usize,
    },
    ExtractingListing {
        category: usize,
        page: usize,
    },
    PersistingArticles {
        category: usize,
        page: usize,
    },
    Done,
    /// The configuration was rejected before any fetch.
    Failed,
    Cancelled,
}

impl CrawlState {
    pub fn is_finished(self) -> bool {
        matches!(self, CrawlState::Done | CrawlState::Failed | CrawlState::Cancelled)
    }
}

/// Live counters of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlProgress {
    pub state: CrawlState,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub articles_discovered: usize,
    pub articles_saved: usize,
    pub articles_skipped: usize,
    pub articles_failed: usize,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Every summary seen, once per source URL, in discovery order.
    pub discovered: Vec<ArticleSummary>,
    pub saved: usize,
    /// Summaries whose source URL was already stored.
    pub skipped_existing: usize,
    /// Detail pages without an extractable body.
    pub skipped_no_content: usize,
    /// Detail fetches or store writes that failed.
    pub failed: usize,
    /// Listing pages that could not be fetched.
    pub pages_failed: usize,
    pub cancelled: bool,
}

impl CrawlReport {
    pub fn articles_discovered(&self) -> &[ArticleSummary] {
        &self.discovered
    }

    /// Counters only, for printing.
    pub fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            articles_discovered: self.discovered.len(),
            articles_saved: self.saved,
            skipped_existing: self.skipped_existing,
            skipped_no_content: self.skipped_no_content,
            articles_failed: self.failed,
            pages_failed: self.pages_failed,
            cancelled: self.cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSummary {
    pub articles_discovered: usize,
    pub articles_saved: usize,
    pub skipped_existing: usize,
    pub skipped_no_content: usize,
    pub articles_failed: usize,
    pub pages_failed: usize,
    pub cancelled: bool,
}

/// What happened to a single summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArticleOutcome {
    Saved,
    AlreadyStored,
    NoContent,
    Failed,
}

/// Sequential crawler over the configured categories.
///
/// Generic over the page source and the store so tests can script both.
pub struct Crawler<F, S> {
    config: CrawlConfig,
    fetcher: F,
    store: S,
    cancel: CancellationToken,
    progress: watch::Sender<CrawlProgress>,
}

impl<F, S> Crawler<F, S>
where
    F: PageSource,
    S: ArticleStore,
{
    pub fn new(config: CrawlConfig, fetcher: F, store: S) -> Self {
        let (progress, _) = watch::channel(CrawlProgress::default());
        Self {
            config,
            fetcher,
            store,
            cancel: CancellationToken::new(),
            progress,
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CrawlProgress> {
        self.progress.subscribe()
    }

    /// Run one crawl over every configured category.
    ///
    /// # Returns
    ///
    /// A [`CrawlReport`] with the de-duplicated summaries and per-outcome
    /// counters. A cancelled run returns what it had so far with
    /// `cancelled` set.
    ///
    /// # Errors
    ///
    /// [`CrawlError::Config`] if the configuration is rejected. Nothing is
    /// fetched in that case.
    #[instrument(
        level = "info",
        skip_all,
        fields(
            categories = self.config.categories.len(),
            page_depth = self.config.page_depth
        )
    )]
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let t0 = Instant::now();
        let site_root = match self
            .config
            .validate()
            .and_then(|_| self.config.site_root_url())
        {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Invalid crawl configuration");
                self.set_state(CrawlState::Failed);
                return Err(e.into());
            }
        };

        let mut report = CrawlReport::default();
        let mut discovered = Vec::new();

        'categories: for (index, category) in self.config.categories.iter().enumerate() {
            self.set_state(CrawlState::RunningCategory { category: index });
            info!(category = %category.name, url = %category.url, "Crawling category");

            for page in 1..=self.config.page_depth {
                if self.cancel.is_cancelled() {
                    break 'categories;
                }
                self.crawl_page(index, category, page, &site_root, &mut report, &mut discovered)
                    .await;
                if !self.pause(self.config.delays.page()).await {
                    break 'categories;
                }
            }

            if !self.pause(self.config.delays.category()).await {
                break 'categories;
            }
        }

        report.discovered = discovered
            .into_iter()
            .unique_by(|s: &ArticleSummary| s.source_url.clone())
            .collect();
        report.cancelled = self.cancel.is_cancelled();

        let state = if report.cancelled {
            CrawlState::Cancelled
        } else {
            CrawlState::Done
        };
        self.set_state(state);

        info!(
            discovered = report.discovered.len(),
            saved = report.saved,
            skipped_existing = report.skipped_existing,
            skipped_no_content = report.skipped_no_content,
            failed = report.failed,
            pages_failed = report.pages_failed,
            cancelled = report.cancelled,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Crawl finished"
        );
        Ok(report)
    }

    #[instrument(level = "info", skip_all, fields(category = %category.name, page = page))]
    async fn crawl_page(
        &self,
        index: usize,
        category: &CategorySpec,
        page: usize,
        site_root: &Url,
        report: &mut CrawlReport,
        discovered: &mut Vec<ArticleSummary>,
    ) {
        self.set_state(CrawlState::RunningPage { category: index, page });
        let url = category.page_url(page, &self.config.page_suffix);

        let listing = match self.fetcher.fetch(&url, FetchKind::Listing).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(%url, error = %e, "Listing page fetch failed; moving on");
                report.pages_failed += 1;
                self.progress.send_modify(|p| p.pages_failed += 1);
                return;
            }
        };
        self.progress.send_modify(|p| p.pages_fetched += 1);

        self.set_state(CrawlState::ExtractingListing { category: index, page });
        let summaries = extract_listing(&listing.body, category, site_root);
        info!(%url, count = summaries.len(), "Extracted listing");

        let seen: HashSet<&str> = discovered.iter().map(|s| s.source_url.as_str()).collect();
        let fresh = summaries
            .iter()
            .map(|s| s.source_url.as_str())
            .filter(|url| !seen.contains(url))
            .unique()
            .count();
        discovered.extend(summaries.iter().cloned());
        self.progress.send_modify(|p| p.articles_discovered += fresh);

        self.set_state(CrawlState::PersistingArticles { category: index, page });
        for summary in &summaries {
            if self.cancel.is_cancelled() {
                return;
            }

            match self.process_article(summary, site_root).await {
                ArticleOutcome::Saved => {
                    report.saved += 1;
                    self.progress.send_modify(|p| p.articles_saved += 1);
                }
                ArticleOutcome::AlreadyStored => {
                    report.skipped_existing += 1;
                    self.progress.send_modify(|p| p.articles_skipped += 1);
                }
                ArticleOutcome::NoContent => {
                    report.skipped_no_content += 1;
                    self.progress.send_modify(|p| p.articles_skipped += 1);
                }
                ArticleOutcome::Failed => {
                    report.failed += 1;
                    self.progress.send_modify(|p| p.articles_failed += 1);
                }
            }

            if !self.pause(self.config.delays.article()).await {
                return;
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(source_url = %summary.source_url))]
    async fn process_article(&self, summary: &ArticleSummary, site_root: &Url) -> ArticleOutcome {
        match self.store.exists(&summary.source_url).await {
            Ok(true) => {
                debug!("Article already exists");
                return ArticleOutcome::AlreadyStored;
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "Store lookup failed");
                return ArticleOutcome::Failed;
            }
        }

        let detail = match self.fetcher.fetch(&summary.source_url, FetchKind::Detail).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(error = %e, "Article fetch failed");
                return ArticleOutcome::Failed;
            }
        };

        let Some(content) = extract_content(&detail.body, site_root) else {
            info!(title = %summary.title, "No content found; skipping article");
            debug!(preview = %truncate_for_log(&detail.body, 300), "Detail page without a body container");
            return ArticleOutcome::NoContent;
        };

        let article = Article::from_summary(summary, content, &self.config.source_name);
        match self.store.insert(article).await {
            Ok(()) => {
                info!(title = %summary.title, category = %summary.category, "Saved article");
                ArticleOutcome::Saved
            }
            Err(StoreError::DuplicateKey(_)) => {
                debug!("Article stored concurrently; treating as existing");
                ArticleOutcome::AlreadyStored
            }
            Err(e) => {
                error!(error = %e, "Failed to store article");
                ArticleOutcome::Failed
            }
        }
    }

    /// Sleep for `delay` unless cancelled first. Returns `false` once cancelled.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    fn set_state(&self, state: CrawlState) {
        debug!(?state, "Crawl state");
        self.progress.send_modify(|p| p.state = state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayConfig;
    use crate::error::{ConfigError, FetchError};
    use crate::fetcher::FetchedPage;
    use crate::store::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies by URL; anything else is a 404.
    #[derive(Default)]
    struct FakeSite {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<(String, FetchKind)>>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl FakeSite {
        fn page(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        fn requested(&self, kind: FetchKind) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, k)| *k == kind)
                .map(|(u, _)| u.clone())
                .collect()
        }
    }

    impl PageSource for FakeSite {
        async fn fetch(&self, url: &str, kind: FetchKind) -> Result<FetchedPage, FetchError> {
            self.requests.lock().unwrap().push((url.to_string(), kind));
            if let Some((trigger, token)) = &self.cancel_on {
                if trigger == url {
                    token.cancel();
                }
            }
            match self.pages.get(url) {
                Some(body) => Ok(FetchedPage {
                    url: url.to_string(),
                    status: 200,
                    content_type: "text/html".to_string(),
                    body: body.clone(),
                }),
                None => Err(FetchError::status(url, 404)),
            }
        }
    }

    const SPORTS: &str = "https://vnexpress.net/the-thao";

    fn listing(slugs: &[&str]) -> String {
        let cards: String = slugs
            .iter()
            .map(|slug| {
                format!(
                    r#"<article class="item-news"><h3 class="title-news"><a href="/the-thao/{slug}.html">Tin {slug}</a></h3><p class="description">Tóm tắt {slug}</p></article>"#
                )
            })
            .collect();
        format!("<html><body>{cards}</body></html>")
    }

    fn detail(text: &str) -> String {
        format!(r#"<html><body><article class="fck_detail"><p>{text}</p></article></body></html>"#)
    }

    fn article_url(slug: &str) -> String {
        format!("https://vnexpress.net/the-thao/{slug}.html")
    }

    fn sports_config(depth: usize) -> CrawlConfig {
        CrawlConfig {
            categories: vec![CategorySpec::new(SPORTS, "Thể thao", "/the-thao/")],
            page_depth: depth,
            delays: DelayConfig::none(),
            ..CrawlConfig::default()
        }
    }

    fn sports_site() -> FakeSite {
        FakeSite::default()
            .page(SPORTS, listing(&["a", "b", "c"]))
            .page(&format!("{SPORTS}-p2"), listing(&["d", "a", "e"]))
            .page(&article_url("a"), detail("A"))
            .page(&article_url("b"), detail("B"))
            .page(&article_url("c"), detail("C"))
            .page(&article_url("d"), detail("D"))
            .page(&article_url("e"), "<html><body><p>Chỉ có video</p></body></html>")
    }

    #[tokio::test]
    async fn test_sports_two_pages_end_to_end() {
        let site = sports_site();
        let store = MemoryStore::new();
        let crawler = Crawler::new(sports_config(2), &site, &store);

        let report = crawler.run().await.unwrap();

        let urls: Vec<&str> = report
            .articles_discovered()
            .iter()
            .map(|s| s.source_url.as_str())
            .collect();
        assert_eq!(
            urls,
            vec![
                article_url("a"),
                article_url("b"),
                article_url("c"),
                article_url("d"),
                article_url("e")
            ]
        );
        assert_eq!(report.saved, 4);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.skipped_no_content, 1);
        assert_eq!(report.failed, 0);
        assert!(!report.cancelled);

        assert_eq!(store.len().await, 4);
        let saved = store.get(&article_url("d")).await.unwrap();
        assert_eq!(saved.category, "Thể thao");
        assert_eq!(saved.source, "VnExpress");
        assert_eq!(saved.summary.as_deref(), Some("Tóm tắt d"));
        assert_eq!(saved.content, "<p>D</p>");
        assert_eq!(saved.view_count, 0);
        assert!(store.get(&article_url("e")).await.is_none());

        // The repeat of "a" on page 2 is never fetched twice.
        let details = site.requested(FetchKind::Detail);
        assert_eq!(details.iter().filter(|u| **u == article_url("a")).count(), 1);
        assert_eq!(
            site.requested(FetchKind::Listing),
            vec![SPORTS.to_string(), format!("{SPORTS}-p2")]
        );
    }

    #[tokio::test]
    async fn test_summary_serializes_camel_case() {
        let site = sports_site();
        let store = MemoryStore::new();
        let report = Crawler::new(sports_config(2), &site, &store).run().await.unwrap();

        let json = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(json["articlesDiscovered"], 5);
        assert_eq!(json["articlesSaved"], 4);
        assert_eq!(json["skippedExisting"], 1);
        assert_eq!(json["skippedNoContent"], 1);
        assert_eq!(json["cancelled"], false);
    }

    #[tokio::test]
    async fn test_second_run_inserts_nothing() {
        let site = sports_site();
        let store = MemoryStore::new();

        let first = Crawler::new(sports_config(2), &site, &store).run().await.unwrap();
        assert_eq!(first.saved, 4);

        let second = Crawler::new(sports_config(2), &site, &store).run().await.unwrap();
        assert_eq!(second.saved, 0);
        assert_eq!(second.discovered.len(), 5);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_empty_categories_fail_without_fetching() {
        let site = sports_site();
        let store = MemoryStore::new();
        let config = CrawlConfig {
            categories: Vec::new(),
            ..sports_config(1)
        };
        let crawler = Crawler::new(config, &site, &store);
        let progress = crawler.subscribe();

        let err = crawler.run().await.unwrap_err();
        assert!(matches!(err, CrawlError::Config(ConfigError::NoCategories)));
        assert!(site.requests.lock().unwrap().is_empty());
        assert_eq!(progress.borrow().state, CrawlState::Failed);
    }

    #[tokio::test]
    async fn test_failed_listing_page_does_not_stop_the_run() {
        let site = FakeSite::default()
            .page(&format!("{SPORTS}-p2"), listing(&["d"]))
            .page(&article_url("d"), detail("D"));
        let store = MemoryStore::new();

        let report = Crawler::new(sports_config(2), &site, &store).run().await.unwrap();
        assert_eq!(report.pages_failed, 1);
        assert_eq!(report.saved, 1);
        assert!(store.get(&article_url("d")).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_detail_fetch_is_counted() {
        let site = FakeSite::default()
            .page(SPORTS, listing(&["a", "b"]))
            .page(&article_url("b"), detail("B"));
        let store = MemoryStore::new();

        let report = Crawler::new(sports_config(1), &site, &store).run().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.saved, 1);
    }

    /// Reports every URL as new, then rejects every insert with `error`.
    struct RejectingStore {
        error: fn(&str) -> StoreError,
        inserts: Mutex<usize>,
    }

    impl ArticleStore for RejectingStore {
        async fn exists(&self, _source_url: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn insert(&self, article: Article) -> Result<(), StoreError> {
            *self.inserts.lock().unwrap() += 1;
            Err((self.error)(&article.source_url))
        }
    }

    /// Forgets lookups, so a concurrent writer's insert surfaces as a duplicate.
    #[derive(Default)]
    struct StaleLookupStore {
        inner: MemoryStore,
    }

    impl ArticleStore for StaleLookupStore {
        async fn exists(&self, _source_url: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn insert(&self, article: Article) -> Result<(), StoreError> {
            self.inner.insert(article).await
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_on_insert_counts_as_existing() {
        let site = FakeSite::default()
            .page(SPORTS, listing(&["a"]))
            .page(&format!("{SPORTS}-p2"), listing(&["a"]))
            .page(&article_url("a"), detail("A"));
        let store = StaleLookupStore::default();

        let report = Crawler::new(sports_config(2), &site, &store).run().await.unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_does_not_abort_the_run() {
        let site = sports_site();
        let store = RejectingStore {
            error: |_| StoreError::Unavailable("disk full".to_string()),
            inserts: Mutex::new(0),
        };
        let crawler = Crawler::new(sports_config(2), &site, &store);
        let progress = crawler.subscribe();

        let report = crawler.run().await.unwrap();
        assert_eq!(report.saved, 0);
        // a, b, c, d, a again: every article with content reaches the store.
        assert_eq!(report.failed, 5);
        assert_eq!(report.skipped_no_content, 1);
        assert_eq!(report.pages_failed, 0);
        assert_eq!(*store.inserts.lock().unwrap(), 5);
        assert_eq!(
            site.requested(FetchKind::Listing),
            vec![SPORTS.to_string(), format!("{SPORTS}-p2")]
        );
        assert_eq!(progress.borrow().state, CrawlState::Done);
        assert_eq!(progress.borrow().articles_failed, 5);
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_articles() {
        let token = CancellationToken::new();
        let mut site = sports_site();
        site.cancel_on = Some((article_url("b"), token.clone()));
        let store = MemoryStore::new();
        let crawler = Crawler::new(sports_config(2), &site, &store).with_cancellation(token);

        let report = crawler.run().await.unwrap();
        assert!(report.cancelled);
        // The in-flight article completes; nothing after it starts.
        assert_eq!(report.saved, 2);
        assert!(store.get(&article_url("c")).await.is_none());
        assert_eq!(site.requested(FetchKind::Listing), vec![SPORTS.to_string()]);
        assert_eq!(crawler.subscribe().borrow().state, CrawlState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_politeness_delay() {
        let site = sports_site();
        let store = MemoryStore::new();
        let config = CrawlConfig {
            delays: DelayConfig {
                article_ms: 0,
                page_ms: 60_000,
                category_ms: 60_000,
            },
            ..sports_config(2)
        };
        let crawler = Crawler::new(config, &site, &store);
        let token = crawler.cancellation_token();

        let canceller = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        };
        let (report, ()) = tokio::join!(crawler.run(), canceller);

        let report = report.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.saved, 3);
        assert_eq!(site.requested(FetchKind::Listing).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_politeness_delays_are_applied() {
        let site = FakeSite::default()
            .page(SPORTS, listing(&["a", "b"]))
            .page(&article_url("a"), detail("A"))
            .page(&article_url("b"), detail("B"));
        let store = MemoryStore::new();
        let config = CrawlConfig {
            delays: DelayConfig::default(),
            ..sports_config(1)
        };

        let t0 = tokio::time::Instant::now();
        Crawler::new(config, &site, &store).run().await.unwrap();
        // 2 articles * 300ms + 1 page * 2000ms + 1 category * 3000ms
        assert!(t0.elapsed() >= Duration::from_millis(5600));
    }

    #[tokio::test]
    async fn test_progress_reports_final_counters() {
        let site = sports_site();
        let store = MemoryStore::new();
        let crawler = Crawler::new(sports_config(2), &site, &store);
        let progress = crawler.subscribe();

        crawler.run().await.unwrap();

        let p = progress.borrow().clone();
        assert_eq!(p.state, CrawlState::Done);
        assert!(p.state.is_finished());
        assert_eq!(p.pages_fetched, 2);
        assert_eq!(p.articles_discovered, 5);
        assert_eq!(p.articles_saved, 4);
        assert_eq!(p.articles_skipped, 2);
        assert_eq!(p.articles_failed, 0);
    }
}
