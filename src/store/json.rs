//! Append-only JSON Lines article store.
//!
//! Each article is one JSON object on its own line. The file is read once
//! on open; every insert appends a single line, so a run costs one write
//! per saved article no matter how large the store already is.
//!
//! # File Layout
//!
//! ```text
//! store_dir/
//! └── articles.jsonl   # { "title": ..., "sourceUrl": ..., ... }\n per article
//! ```
//!
//! A crash mid-append can leave a final line without its newline. Such a
//! torn tail is dropped (and cut from the file) on open. Any other line that
//! does not parse makes the store unavailable.

use super::ArticleStore;
use crate::error::StoreError;
use crate::models::Article;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Default)]
struct Inner {
    articles: Vec<Article>,
    keys: HashSet<String>,
}

/// Articles persisted to a JSON Lines file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing articles if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file exists but cannot be
    /// read, or holds a line that is not an article.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                error!(error = %e, "Failed to read article store");
                return Err(e.into());
            }
        };

        let (articles, valid_len) = parse_lines(&raw)?;
        if valid_len < raw.len() {
            warn!(
                dropped_bytes = raw.len() - valid_len,
                "Dropping torn final line from article store"
            );
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(valid_len as u64).await?;
        }

        let keys = articles.iter().map(|a| a.source_url.clone()).collect();
        info!(count = articles.len(), "Opened article store");
        Ok(Self {
            path,
            inner: Mutex::new(Inner { articles, keys }),
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.articles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.articles.is_empty()
    }

    /// Snapshot of all stored articles in insertion order.
    pub async fn articles(&self) -> Vec<Article> {
        self.inner.lock().await.articles.clone()
    }

    async fn append(&self, article: &Article) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(article)?;
        line.push(b'\n');
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        debug!(path = %self.path.display(), bytes = line.len(), "Appended article");
        Ok(())
    }
}

/// Parse every complete line. Returns the articles and the byte length of
/// the well-formed prefix, which is shorter than `raw` only for a torn tail.
fn parse_lines(raw: &str) -> Result<(Vec<Article>, usize), StoreError> {
    let mut articles = Vec::new();
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        let complete = line.ends_with('\n');
        let body = line.trim();
        if !body.is_empty() {
            match serde_json::from_str::<Article>(body) {
                Ok(article) => articles.push(article),
                Err(_) if !complete => return Ok((articles, offset)),
                Err(e) => return Err(e.into()),
            }
        }
        offset += line.len();
    }
    Ok((articles, offset))
}

impl ArticleStore for JsonFileStore {
    async fn exists(&self, source_url: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.keys.contains(source_url))
    }

    #[instrument(level = "debug", skip_all, fields(source_url = %article.source_url))]
    async fn insert(&self, article: Article) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.keys.contains(&article.source_url) {
            return Err(StoreError::DuplicateKey(article.source_url));
        }

        if let Err(e) = self.append(&article).await {
            error!(error = %e, "Failed to persist article");
            return Err(e);
        }
        inner.keys.insert(article.source_url.clone());
        inner.articles.push(article);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleSummary;
    use tempfile::TempDir;

    fn article(url: &str) -> Article {
        let summary = ArticleSummary {
            title: "Tin thể thao".to_string(),
            source_url: url.to_string(),
            thumbnail: Some("https://i.vnecdn.net/a.jpg".to_string()),
            summary: Some("Tóm tắt".to_string()),
            category: "Thể thao".to_string(),
        };
        Article::from_summary(&summary, "<p>Nội dung</p>".to_string(), "VnExpress")
    }

    fn line_of(article: &Article) -> String {
        format!("{}\n", serde_json::to_string(article).unwrap())
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("articles.jsonl")).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_articles_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("articles.jsonl");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.insert(article("https://vnexpress.net/the-thao/a.html")).await.unwrap();
        store.insert(article("https://vnexpress.net/the-thao/b.html")).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        assert!(reopened.exists("https://vnexpress.net/the-thao/a.html").await.unwrap());
        let articles = reopened.articles().await;
        assert_eq!(articles[0].source_url, "https://vnexpress.net/the-thao/a.html");
        assert_eq!(articles[0].content, "<p>Nội dung</p>");
    }

    #[tokio::test]
    async fn test_insert_appends_one_line_and_keeps_earlier_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("articles.jsonl");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.insert(article("https://vnexpress.net/a.html")).await.unwrap();
        let before = tokio::fs::read_to_string(&path).await.unwrap();
        store.insert(article("https://vnexpress.net/b.html")).await.unwrap();
        let after = tokio::fs::read_to_string(&path).await.unwrap();

        assert!(after.starts_with(&before));
        assert_eq!(after.lines().count(), 2);
        let second: Article = serde_json::from_str(after.lines().nth(1).unwrap()).unwrap();
        assert_eq!(second.source_url, "https://vnexpress.net/b.html");
    }

    #[tokio::test]
    async fn test_duplicate_key_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("articles.jsonl");

        let store = JsonFileStore::open(&path).await.unwrap();
        store.insert(article("https://vnexpress.net/a.html")).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let err = reopened
            .insert(article("https://vnexpress.net/a.html"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
        assert_eq!(reopened.len().await, 1);
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_line_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("articles.jsonl");
        let good = line_of(&article("https://vnexpress.net/a.html"));
        tokio::fs::write(&path, format!("{{not json\n{good}")).await.unwrap();

        let err = JsonFileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_torn_final_line_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("articles.jsonl");
        let good = line_of(&article("https://vnexpress.net/a.html"));
        tokio::fs::write(&path, format!("{good}{{\"title\":\"cut of")).await.unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.len().await, 1);
        store.insert(article("https://vnexpress.net/b.html")).await.unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        assert!(reopened.exists("https://vnexpress.net/b.html").await.unwrap());
    }

    #[tokio::test]
    async fn test_view_count_is_preserved_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("articles.jsonl");
        let mut seen = article("https://vnexpress.net/a.html");
        seen.view_count = 42;
        tokio::fs::write(&path, line_of(&seen)).await.unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        store.insert(article("https://vnexpress.net/b.html")).await.unwrap();

        let articles = store.articles().await;
        assert_eq!(articles[0].view_count, 42);
        assert_eq!(articles[1].view_count, 0);
    }
}
