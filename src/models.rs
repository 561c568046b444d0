//! Data models for crawled articles.
//!
//! This module defines the core data structures used throughout the crawler:
//! - [`ArticleSummary`]: One entry of a category listing page
//! - [`Article`]: A fully crawled article as persisted by an [`crate::store::ArticleStore`]
//! - [`FetchAttempt`]: Retry bookkeeping for a single URL
//!
//! Persisted fields use camelCase in JSON so the read side can keep the
//! document shape it already serves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate article found on a listing page.
///
/// Summaries are transient: they are the input to the detail fetch and are
/// reported back to the caller of a crawl run, but never stored directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub title: String,
    /// Absolute URL of the detail page. Also the dedup key.
    pub source_url: String,
    pub thumbnail: Option<String>,
    pub summary: Option<String>,
    /// Name of the category whose listing produced this entry.
    pub category: String,
}

/// A crawled article.
///
/// `source_url` is unique across the store. The crawler creates an article
/// once and never updates it afterwards; `view_count` belongs to the read side.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    /// Sanitized HTML body.
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub category: String,
    /// Source identifier, e.g. `VnExpress`.
    pub source: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Build a new article from a listing entry and its extracted body.
    pub fn from_summary(summary: &ArticleSummary, content: String, source: &str) -> Self {
        let now = Utc::now();
        Self {
            title: summary.title.clone(),
            content,
            summary: summary.summary.clone(),
            thumbnail: summary.thumbnail.clone(),
            category: summary.category.clone(),
            source: source.to_string(),
            source_url: summary.source_url.clone(),
            published_at: now,
            view_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Retry bookkeeping for one URL.
///
/// Threaded by value through the retry loop and dropped once the fetch
/// succeeds or gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub url: String,
    /// 1-based number of the attempt about to be made.
    pub attempt: usize,
    pub last_error: Option<String>,
}

impl FetchAttempt {
    pub fn first(url: &str) -> Self {
        Self {
            url: url.to_string(),
            attempt: 1,
            last_error: None,
        }
    }

    /// The attempt after this one failed with `error`.
    pub fn next(self, error: String) -> Self {
        Self {
            url: self.url,
            attempt: self.attempt + 1,
            last_error: Some(error),
        }
    }

    /// Retries already made before this attempt.
    pub fn retries(&self) -> usize {
        self.attempt.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ArticleSummary {
        ArticleSummary {
            title: "Đội tuyển thắng lớn".to_string(),
            source_url: "https://vnexpress.net/the-thao/doi-tuyen-1.html".to_string(),
            thumbnail: Some("https://i.vnecdn.net/a.jpg".to_string()),
            summary: Some("Tóm tắt".to_string()),
            category: "Thể thao".to_string(),
        }
    }

    #[test]
    fn test_article_from_summary() {
        let article = Article::from_summary(&summary(), "<p>x</p>".to_string(), "VnExpress");
        assert_eq!(article.source_url, "https://vnexpress.net/the-thao/doi-tuyen-1.html");
        assert_eq!(article.category, "Thể thao");
        assert_eq!(article.source, "VnExpress");
        assert_eq!(article.view_count, 0);
        assert_eq!(article.created_at, article.updated_at);
    }

    #[test]
    fn test_article_serializes_camel_case() {
        let article = Article::from_summary(&summary(), "<p>x</p>".to_string(), "VnExpress");
        let json = serde_json::to_string(&article).unwrap();
        assert!(json.contains("\"sourceUrl\""));
        assert!(json.contains("\"viewCount\":0"));
        assert!(json.contains("\"publishedAt\""));
    }

    #[test]
    fn test_article_view_count_defaults_when_missing() {
        let json = r#"{
            "title": "t",
            "content": "<p>c</p>",
            "category": "Other",
            "source": "VnExpress",
            "sourceUrl": "https://vnexpress.net/a.html",
            "publishedAt": "2025-05-06T08:00:00Z",
            "createdAt": "2025-05-06T08:00:00Z",
            "updatedAt": "2025-05-06T08:00:00Z"
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert_eq!(article.view_count, 0);
        assert_eq!(article.summary, None);
    }

    #[test]
    fn test_fetch_attempt_progression() {
        let attempt = FetchAttempt::first("https://vnexpress.net");
        assert_eq!(attempt.attempt, 1);
        assert_eq!(attempt.retries(), 0);

        let attempt = attempt.next("HTTP 500".to_string());
        assert_eq!(attempt.attempt, 2);
        assert_eq!(attempt.retries(), 1);
        assert_eq!(attempt.last_error.as_deref(), Some("HTTP 500"));
    }
}
