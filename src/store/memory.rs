//! In-process article store.

use super::ArticleStore;
use crate::error::StoreError;
use crate::models::Article;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Articles held in memory, keyed by source URL.
#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: Mutex<HashMap<String, Article>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.articles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.articles.lock().await.is_empty()
    }

    pub async fn get(&self, source_url: &str) -> Option<Article> {
        self.articles.lock().await.get(source_url).cloned()
    }
}

impl ArticleStore for MemoryStore {
    async fn exists(&self, source_url: &str) -> Result<bool, StoreError> {
        Ok(self.articles.lock().await.contains_key(source_url))
    }

    async fn insert(&self, article: Article) -> Result<(), StoreError> {
        let mut articles = self.articles.lock().await;
        if articles.contains_key(&article.source_url) {
            return Err(StoreError::DuplicateKey(article.source_url));
        }
        articles.insert(article.source_url.clone(), article);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleSummary;

    fn article(url: &str) -> Article {
        let summary = ArticleSummary {
            title: "Tin".to_string(),
            source_url: url.to_string(),
            thumbnail: None,
            summary: None,
            category: "Other".to_string(),
        };
        Article::from_summary(&summary, "<p>x</p>".to_string(), "VnExpress")
    }

    #[tokio::test]
    async fn test_insert_then_exists() {
        let store = MemoryStore::new();
        assert!(!store.exists("https://vnexpress.net/a.html").await.unwrap());
        store.insert(article("https://vnexpress.net/a.html")).await.unwrap();
        assert!(store.exists("https://vnexpress.net/a.html").await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected_and_keeps_original() {
        let store = MemoryStore::new();
        store.insert(article("https://vnexpress.net/a.html")).await.unwrap();

        let mut second = article("https://vnexpress.net/a.html");
        second.title = "Changed".to_string();
        let err = store.insert(second).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(ref url) if url == "https://vnexpress.net/a.html"));

        let kept = store.get("https://vnexpress.net/a.html").await.unwrap();
        assert_eq!(kept.title, "Tin");
        assert_eq!(store.len().await, 1);
    }
}
