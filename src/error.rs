//! Error types for fetching, storage, configuration and crawl runs.
//!
//! Only [`CrawlError`] is fatal to a run. Everything else is caught by the
//! crawler, logged and counted as a soft failure of one page or one article.

/// What went wrong with a single HTTP fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FetchErrorKind {
    /// The request did not complete within the configured timeout.
    #[error("timeout")]
    Timeout,
    /// Connection, DNS or TLS failure.
    #[error("network")]
    Network,
    /// The origin answered with a non-success status code.
    #[error("status")]
    Status,
    /// The response body could not be read or decoded.
    #[error("body")]
    Body,
    /// The URL could not be parsed.
    #[error("invalid url")]
    InvalidUrl,
}

/// A fetch that failed, after retries when the failure was retryable.
#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch of '{url}' failed ({kind}{}): {cause}", status_suffix(.status))]
pub struct FetchError {
    pub url: String,
    pub status: Option<u16>,
    pub kind: FetchErrorKind,
    pub cause: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" {s}")).unwrap_or_default()
}

impl FetchError {
    pub fn new(url: impl Into<String>, kind: FetchErrorKind, cause: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            kind,
            cause: cause.into(),
        }
    }

    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            kind: FetchErrorKind::Status,
            cause: format!("HTTP {status}"),
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// 406 and every 5xx are retried, as are timeouts and network failures.
    /// Any other 4xx is permanent for that URL.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            FetchErrorKind::Timeout | FetchErrorKind::Network => true,
            FetchErrorKind::Status => {
                matches!(self.status, Some(406) | Some(500..=599))
            }
            FetchErrorKind::Body | FetchErrorKind::InvalidUrl => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            FetchErrorKind::Timeout
        } else if e.is_body() || e.is_decode() {
            FetchErrorKind::Body
        } else if e.is_builder() {
            FetchErrorKind::InvalidUrl
        } else {
            FetchErrorKind::Network
        };
        Self {
            url: url.to_string(),
            status: e.status().map(|s| s.as_u16()),
            kind,
            cause: e.to_string(),
        }
    }
}

/// Failures of the article store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An article with this source URL is already stored.
    #[error("article with source url '{0}' already exists")]
    DuplicateKey(String),

    /// The backing storage could not be read or written.
    #[error("article store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Invalid crawl configuration. A run refuses to start on any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no categories configured")]
    NoCategories,

    #[error("page depth must be at least 1, got {0}")]
    InvalidPageDepth(usize),

    #[error("invalid url for {field}: '{value}'")]
    InvalidUrl { field: String, value: String },

    #[error("page suffix '{0}' must contain the {{page}} placeholder")]
    InvalidPageSuffix(String),

    #[error("invalid {field} header value '{value}'")]
    InvalidHeader { field: String, value: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Fatal errors of a crawl run.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("refusing to start crawl: {0}")]
    Config(#[from] ConfigError),
}
