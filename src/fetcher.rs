//! HTTP page fetching with linear backoff retry.
//!
//! # Architecture
//!
//! - [`PageSource`]: Core trait defining an async page fetch
//! - [`HttpFetcher`]: One-shot `reqwest` implementation with browser headers
//! - [`RetryFetch`]: Decorator that adds the retry policy to any `PageSource`
//!
//! # Retry Strategy
//!
//! - Retryable: HTTP 406, any 5xx, timeouts and network failures
//! - Permanent: every other 4xx, unreadable bodies, invalid URLs
//! - Up to 3 retries, retry `n` waits `n * 1s` (1s, 2s, 3s)

use crate::config::FetchConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::models::FetchAttempt;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, REFERER};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_IMAGE: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// What is being fetched. Decides the `Accept` header and whether the
/// origin `Referer` is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// A category listing page.
    Listing,
    /// An article detail page. Sent with the origin `Referer`.
    Detail,
    /// An image. Sent with the origin `Referer`.
    Image,
}

impl FetchKind {
    fn accept(self) -> &'static str {
        match self {
            FetchKind::Listing | FetchKind::Detail => ACCEPT_HTML,
            FetchKind::Image => ACCEPT_IMAGE,
        }
    }

    fn wants_referer(self) -> bool {
        matches!(self, FetchKind::Detail | FetchKind::Image)
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// A successfully fetched image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Trait for async page fetches.
///
/// Implementors fetch one URL and either return its body or a [`FetchError`]
/// describing why not. Retrying is left to [`RetryFetch`].
pub trait PageSource {
    async fn fetch(&self, url: &str, kind: FetchKind) -> Result<FetchedPage, FetchError>;
}

impl<T: PageSource> PageSource for &T {
    async fn fetch(&self, url: &str, kind: FetchKind) -> Result<FetchedPage, FetchError> {
        (**self).fetch(url, kind).await
    }
}

/// One-shot HTTP fetcher.
///
/// Sends a browser User-Agent, an `Accept` header matching the [`FetchKind`]
/// and, for detail and image fetches, a `Referer` pointing at the site root
/// since the origin rejects some requests without one. Each request carries
/// the configured timeout. Nothing is cached.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    referer: String,
    allowed_image_hosts: Vec<String>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig, site_root: &Url) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&config.accept_language) {
            Ok(v) => {
                headers.insert(ACCEPT_LANGUAGE, v);
            }
            Err(e) => {
                warn!(value = %config.accept_language, error = %e, "Invalid Accept-Language; sending none");
            }
        }
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::from_reqwest(site_root.as_str(), e))?;

        let mut referer = site_root.to_string();
        if !referer.ends_with('/') {
            referer.push('/');
        }

        Ok(Self {
            client,
            referer,
            allowed_image_hosts: config.allowed_image_hosts.clone(),
        })
    }

    async fn send(&self, url: &str, kind: FetchKind) -> Result<reqwest::Response, FetchError> {
        let parsed = Url::parse(url)
            .map_err(|e| FetchError::new(url, FetchErrorKind::InvalidUrl, e.to_string()))?;

        let mut request = self.client.get(parsed).header(ACCEPT, kind.accept());
        if kind.wants_referer() {
            request = request.header(REFERER, &self.referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Fetch an image with image `Accept` and the origin `Referer`.
    ///
    /// The upstream content type is passed through, defaulting to `image/jpeg`.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn fetch_image(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let response = self.send(url, FetchKind::Image).await?;
        let content_type = content_type_of(&response).unwrap_or_else(|| "image/jpeg".to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(FetchedImage {
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    /// Whether `url` points at a host an image relay may fetch from.
    pub fn is_allowed_image_host(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.allowed_image_hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }
}

fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl PageSource for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url, ?kind))]
    async fn fetch(&self, url: &str, kind: FetchKind) -> Result<FetchedPage, FetchError> {
        let t0 = Instant::now();
        let response = self.send(url, kind).await?;
        let status = response.status().as_u16();
        let content_type = content_type_of(&response).unwrap_or_else(|| "text/html".to_string());
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(FetchedPage {
            url: url.to_string(),
            status,
            content_type,
            body,
        })
    }
}

/// Wrapper that adds linear backoff retry to any [`PageSource`].
///
/// # Backoff Strategy
///
/// ```text
/// delay(retry n) = n * base_delay
/// ```
pub struct RetryFetch<T> {
    /// The underlying fetcher to wrap.
    inner: T,
    /// Retries allowed after the first attempt.
    max_retries: usize,
    /// Delay unit multiplied by the retry number.
    base_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: PageSource,
{
    /// Create a new retry wrapper around an existing [`PageSource`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// let http = HttpFetcher::new(&config.fetch, &site_root)?;
    /// let fetcher = RetryFetch::new(http, 3, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(inner: T, config: &FetchConfig) -> Self {
        Self::new(inner, config.max_retries, config.backoff_base())
    }

    /// Delay before the given 1-based retry.
    pub fn backoff(&self, retry: usize) -> Duration {
        self.base_delay.saturating_mul(retry as u32)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl<T> PageSource for RetryFetch<T>
where
    T: PageSource,
{
    #[instrument(level = "info", skip_all, fields(%url, ?kind))]
    async fn fetch(&self, url: &str, kind: FetchKind) -> Result<FetchedPage, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = FetchAttempt::first(url);

        loop {
            match self.inner.fetch(&attempt.url, kind).await {
                Ok(page) => {
                    if attempt.retries() > 0 {
                        debug!(retries = attempt.retries(), "Fetch succeeded after retrying");
                    }
                    return Ok(page);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(attempt = attempt.attempt, error = %e, "Permanent fetch failure; not retrying");
                    return Err(e);
                }
                Err(e) => {
                    let retry = attempt.attempt;
                    if retry > self.max_retries {
                        error!(
                            attempt = attempt.attempt,
                            max_retries = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(retry);
                    warn!(
                        attempt = attempt.attempt,
                        max_retries = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    attempt = attempt.next(e.to_string());
                    sleep(delay).await;
                }
            }
        }
    }
}
