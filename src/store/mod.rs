//! Article persistence keyed on the source URL.
//!
//! # Submodules
//!
//! - [`memory`]: In-process store, for tests and dry runs
//! - [`json`]: Single-file JSON store that survives restarts
//!
//! # Uniqueness
//!
//! `source_url` is the store's unique key. [`ArticleStore::insert`] fails
//! with [`StoreError::DuplicateKey`] instead of overwriting, which makes the
//! insert itself the final word on whether an article was already crawled.

pub mod json;
pub mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::Article;

/// Trait for article stores.
pub trait ArticleStore {
    /// Whether an article with this source URL is stored.
    async fn exists(&self, source_url: &str) -> Result<bool, StoreError>;

    /// Store a new article.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateKey`] if the source URL is already stored
    /// - [`StoreError::Unavailable`] if the backing storage fails
    async fn insert(&self, article: Article) -> Result<(), StoreError>;
}

impl<T: ArticleStore> ArticleStore for &T {
    async fn exists(&self, source_url: &str) -> Result<bool, StoreError> {
        (**self).exists(source_url).await
    }

    async fn insert(&self, article: Article) -> Result<(), StoreError> {
        (**self).insert(article).await
    }
}
