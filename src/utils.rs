//! URL normalization, string helpers and file system checks.
//!
//! This module provides helper functions used throughout the crawler:
//! - Resolving image and link URLs found in scraped markup
//! - Whitespace cleanup for text pulled out of HTML
//! - String truncation for logging
//! - File system validation for the article store location

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Resolve an image URL found in scraped markup to an absolute URL.
///
/// Responsive source-set values (`/a.jpg 480w, /b.jpg 800w`) keep only the
/// first candidate. Protocol-relative URLs become `https:` and site-relative
/// URLs are joined onto `site_root`. Absolute URLs pass through unchanged.
///
/// Returns `None` for empty input or values that cannot be resolved.
///
/// # Examples
///
/// ```ignore
/// let root = Url::parse("https://vnexpress.net").unwrap();
/// assert_eq!(normalize_image_url("//cdn.example/a.jpg", &root).unwrap(), "https://cdn.example/a.jpg");
/// assert_eq!(normalize_image_url("/img/a.jpg 480w", &root).unwrap(), "https://vnexpress.net/img/a.jpg");
/// ```
pub fn normalize_image_url(raw: &str, site_root: &Url) -> Option<String> {
    let first = raw.split_whitespace().next()?.trim_end_matches(',');
    if first.is_empty() {
        return None;
    }
    resolve(first, site_root)
}

/// Resolve a link `href` against the site root.
///
/// `http(s)` URLs and other absolute URLs (`mailto:`, `tel:`) are returned
/// unchanged; everything else is made absolute.
pub fn normalize_link_url(raw: &str, site_root: &Url) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    resolve(trimmed, site_root)
}

fn resolve(value: &str, site_root: &Url) -> Option<String> {
    if value.starts_with("//") {
        return Url::parse(&format!("https:{value}")).ok().map(String::from);
    }
    site_root.join(value).ok().map(String::from)
}

/// Whether an article link points at content the crawler does not store.
///
/// Video and infographic stories have no readable body to extract.
pub fn is_excluded_link(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("video") || lower.contains("infographic")
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (backing off to a char boundary) and
/// get `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Store directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
