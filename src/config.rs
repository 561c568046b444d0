//! Crawl configuration loaded from YAML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! crawl of the VnExpress sections the crawler was built for. The category
//! set is product configuration and is expected to be overridden per
//! deployment.

use crate::error::ConfigError;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

const PAGE_PLACEHOLDER: &str = "{page}";

/// One category of the origin site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CategorySpec {
    /// Canonical listing URL, used as-is for page 1.
    pub url: String,
    /// Display name stored on every article crawled from this category.
    pub name: String,
    /// Substring that identifies article URLs belonging to this category.
    pub pattern: String,
}

impl CategorySpec {
    pub fn new(url: &str, name: &str, pattern: &str) -> Self {
        Self {
            url: url.to_string(),
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }

    /// Listing URL for a 1-based page index.
    ///
    /// ```ignore
    /// let c = CategorySpec::new("https://vnexpress.net/the-thao", "Thể thao", "/the-thao/");
    /// assert_eq!(c.page_url(1, "-p{page}"), "https://vnexpress.net/the-thao");
    /// assert_eq!(c.page_url(3, "-p{page}"), "https://vnexpress.net/the-thao-p3");
    /// ```
    pub fn page_url(&self, page: usize, page_suffix: &str) -> String {
        if page <= 1 {
            self.url.clone()
        } else {
            format!(
                "{}{}",
                self.url.trim_end_matches('/'),
                page_suffix.replace(PAGE_PLACEHOLDER, &page.to_string())
            )
        }
    }
}

/// Politeness delays, shortest to longest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Pause after every processed article, saved or skipped.
    pub article_ms: u64,
    /// Pause after every listing page.
    pub page_ms: u64,
    /// Pause after the last page of a category.
    pub category_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            article_ms: 300,
            page_ms: 2000,
            category_ms: 3000,
        }
    }
}

impl DelayConfig {
    /// No delays at all. Only useful against local fixtures.
    pub fn none() -> Self {
        Self {
            article_ms: 0,
            page_ms: 0,
            category_ms: 0,
        }
    }

    pub fn article(&self) -> Duration {
        Duration::from_millis(self.article_ms)
    }

    pub fn page(&self) -> Duration {
        Duration::from_millis(self.page_ms)
    }

    pub fn category(&self) -> Duration {
        Duration::from_millis(self.category_ms)
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: usize,
    /// Retry `n` waits `n * backoff_base_ms`.
    pub backoff_base_ms: u64,
    pub user_agent: String,
    pub accept_language: String,
    /// Image hosts an image relay may fetch from (suffix match on the host).
    pub allowed_image_hosts: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_retries: 3,
            backoff_base_ms: 1000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept_language: "vi-VN,vi;q=0.9,en-US;q=0.8,en;q=0.5".to_string(),
            allowed_image_hosts: vec!["vnexpress.net".to_string(), "vne.co".to_string()],
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Full configuration of a crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Origin root, used for `Referer` and to absolutize relative URLs.
    pub site_root: String,
    /// Source identifier stored on every article.
    pub source_name: String,
    /// Category name for URLs no pattern matches.
    pub fallback_category: String,
    /// Listing pages crawled per category.
    pub page_depth: usize,
    /// Appended to the category URL for pages after the first.
    pub page_suffix: String,
    pub categories: Vec<CategorySpec>,
    pub delays: DelayConfig,
    pub fetch: FetchConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            site_root: "https://vnexpress.net".to_string(),
            source_name: "VnExpress".to_string(),
            fallback_category: "Other".to_string(),
            page_depth: 3,
            page_suffix: "-p{page}".to_string(),
            categories: default_categories(),
            delays: DelayConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

fn default_categories() -> Vec<CategorySpec> {
    [
        ("https://vnexpress.net/thoi-su", "Thời sự", "/thoi-su/"),
        ("https://vnexpress.net/the-gioi", "Thế giới", "/the-gioi/"),
        ("https://vnexpress.net/kinh-doanh", "Kinh doanh", "/kinh-doanh/"),
        ("https://vnexpress.net/giai-tri", "Giải trí", "/giai-tri/"),
        ("https://vnexpress.net/the-thao", "Thể thao", "/the-thao/"),
        ("https://vnexpress.net/khoa-hoc", "Khoa học", "/khoa-hoc/"),
        ("https://vnexpress.net/suc-khoe", "Sức khỏe", "/suc-khoe/"),
        ("https://vnexpress.net/phap-luat", "Pháp luật", "/phap-luat/"),
        ("https://vnexpress.net/du-lich", "Du lịch", "/du-lich/"),
        ("https://vnexpress.net/oto-xe-may", "Ô tô - Xe máy", "/oto-xe-may/"),
    ]
    .into_iter()
    .map(|(url, name, pattern)| CategorySpec::new(url, name, pattern))
    .collect()
}

impl CrawlConfig {
    /// Load a YAML config file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml(&raw)?;
        info!(
            categories = config.categories.len(),
            page_depth = config.page_depth,
            "Loaded crawl configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Reject configurations a run cannot operate on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        if self.page_depth == 0 {
            return Err(ConfigError::InvalidPageDepth(0));
        }
        if !self.page_suffix.contains(PAGE_PLACEHOLDER) {
            return Err(ConfigError::InvalidPageSuffix(self.page_suffix.clone()));
        }
        self.site_root_url()?;
        for (field, value) in [
            ("user_agent", &self.fetch.user_agent),
            ("accept_language", &self.fetch.accept_language),
        ] {
            if HeaderValue::from_str(value).is_err() {
                return Err(ConfigError::InvalidHeader {
                    field: field.to_string(),
                    value: value.clone(),
                });
            }
        }
        for category in &self.categories {
            if Url::parse(&category.url).is_err() || category.name.trim().is_empty() {
                return Err(ConfigError::InvalidUrl {
                    field: format!("category '{}'", category.name),
                    value: category.url.clone(),
                });
            }
        }
        debug!(categories = self.categories.len(), "Configuration validated");
        Ok(())
    }

    pub fn site_root_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.site_root).map_err(|_| ConfigError::InvalidUrl {
            field: "site_root".to_string(),
            value: self.site_root.clone(),
        })
    }

    /// Category name of an article URL, or the fallback bucket.
    pub fn classify(&self, url: &str) -> &str {
        self.categories
            .iter()
            .find(|c| !c.pattern.is_empty() && url.contains(&c.pattern))
            .map(|c| c.name.as_str())
            .unwrap_or(self.fallback_category.as_str())
    }

    /// Keep only the named categories (case-insensitive). An empty filter keeps all.
    pub fn retain_categories(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.categories.retain(|c| {
            names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&c.name) || c.url.ends_with(&format!("/{n}")))
        });
    }
}
