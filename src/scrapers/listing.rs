//! Category listing page extraction.
//!
//! Listing pages enumerate article cards. Each card is located with a
//! container cascade, then title/link, thumbnail and description are each
//! looked up with their own cascade, so one card can take its title from one
//! rule and its thumbnail from another.

use super::{compile, first_matching_all, first_within, non_empty_attr, text_of};
use crate::config::CategorySpec;
use crate::models::ArticleSummary;
use crate::utils::{collapse_whitespace, is_excluded_link, normalize_image_url, normalize_link_url};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

pub(crate) const CONTAINER_SELECTORS: &[&str] = &[
    ".item-news",
    "article.item-news",
    ".box-news-item",
    r#"div[class*="item-news"]"#,
];
pub(crate) const TITLE_SELECTORS: &[&str] = &[
    ".title-news a",
    "h3 a",
    "h2 a",
    "a.title",
    ".heading a",
    "a[title]",
];
pub(crate) const THUMBNAIL_SELECTORS: &[&str] = &[".thumb-art img", "img.thumb", "img", ".image img"];
pub(crate) const DESCRIPTION_SELECTORS: &[&str] = &[".description a", ".description", ".summary", "p"];
pub(crate) const VIDEO_MARKER: &str = r#"[type="VideoStream"]"#;

/// Image attributes in the order they are trusted.
const THUMBNAIL_ATTRS: &[&str] = &["data-src", "src", "srcset"];

static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| compile(CONTAINER_SELECTORS));
static TITLES: Lazy<Vec<Selector>> = Lazy::new(|| compile(TITLE_SELECTORS));
static THUMBNAILS: Lazy<Vec<Selector>> = Lazy::new(|| compile(THUMBNAIL_SELECTORS));
static DESCRIPTIONS: Lazy<Vec<Selector>> = Lazy::new(|| compile(DESCRIPTION_SELECTORS));
static VIDEO: Lazy<Vec<Selector>> = Lazy::new(|| compile(&[VIDEO_MARKER]));

/// Extract article summaries from a category listing page, in document order.
///
/// Returns an empty list when no container selector matches; the caller
/// treats that as a soft failure of the page.
#[instrument(level = "info", skip_all, fields(category = %category.name))]
pub fn extract_listing(html: &str, category: &CategorySpec, site_root: &Url) -> Vec<ArticleSummary> {
    let document = Html::parse_document(html);
    let cards = first_matching_all(&document, &CONTAINERS);
    if cards.is_empty() {
        warn!("No article containers found with any selector");
        return Vec::new();
    }
    debug!(cards = cards.len(), "Found article containers");

    let summaries: Vec<ArticleSummary> = cards
        .into_iter()
        .filter_map(|card| extract_card(card, category, site_root))
        .collect();

    debug!(count = summaries.len(), "Extracted article summaries");
    summaries
}

fn extract_card(card: ElementRef<'_>, category: &CategorySpec, site_root: &Url) -> Option<ArticleSummary> {
    if VIDEO.iter().any(|sel| card.select(sel).next().is_some()) {
        return None;
    }

    let (title, link) = first_within(card, &TITLES, |a| {
        let title = collapse_whitespace(&text_of(a));
        let href = non_empty_attr(a, "href")?;
        if title.is_empty() {
            return None;
        }
        Some((title, href.trim().to_string()))
    })?;

    let source_url = normalize_link_url(&link, site_root)?;
    if is_excluded_link(&source_url) {
        debug!(url = %source_url, "Skipping video/infographic article");
        return None;
    }

    let thumbnail = first_within(card, &THUMBNAILS, |img| {
        THUMBNAIL_ATTRS
            .iter()
            .find_map(|attr| non_empty_attr(img, attr))
            .and_then(|raw| normalize_image_url(raw, site_root))
    });

    let summary = first_within(card, &DESCRIPTIONS, |el| {
        Some(collapse_whitespace(&text_of(el))).filter(|s| !s.is_empty())
    });

    Some(ArticleSummary {
        title,
        source_url,
        thumbnail,
        summary,
        category: category.name.clone(),
    })
}
