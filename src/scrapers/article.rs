//! Article detail page extraction.
//!
//! The body is located with a container cascade and rewritten for display
//! off-site (see [`super::rewrite`]). An optional lead paragraph is placed
//! in front of it inside a `div.article-description` wrapper.

use super::rewrite::rewrite_inner_html;
use super::{compile, first_matching_all};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

pub(crate) const DESCRIPTION_SELECTORS: &[&str] = &[
    ".description",
    ".article-description",
    ".content-detail .description",
];
pub(crate) const BODY_SELECTORS: &[&str] = &[".fck_detail", ".article-content", ".content-detail"];

/// Wrapper for the lead paragraph, so readers can style it apart from the body.
pub const DESCRIPTION_WRAPPER_CLASS: &str = "article-description lead";

static DESCRIPTIONS: Lazy<Vec<Selector>> = Lazy::new(|| compile(DESCRIPTION_SELECTORS));
static BODIES: Lazy<Vec<Selector>> = Lazy::new(|| compile(BODY_SELECTORS));

/// Extract the sanitized HTML content of an article page.
///
/// Returns `None` when no body container matches, or when the matched body
/// is empty after rewriting. Articles without content are never stored.
#[instrument(level = "debug", skip_all)]
pub fn extract_content(html: &str, site_root: &Url) -> Option<String> {
    let document = Html::parse_document(html);

    let (body_selector, bodies) = BODIES
        .iter()
        .map(|sel| (sel, document.select(sel).collect::<Vec<_>>()))
        .find(|(_, found)| !found.is_empty())?;

    let body: String = bodies
        .into_iter()
        .filter(|el| !nested_in_match(*el, body_selector))
        .map(|el| rewrite_inner_html(el, site_root))
        .collect();

    if body.trim().is_empty() {
        debug!("Body container matched but holds no content");
        return None;
    }

    let mut content = String::new();
    if let Some(description) = description_block(&document, site_root) {
        content.push_str(&description);
    }
    content.push_str(&body);

    debug!(bytes = content.len(), "Extracted article content");
    Some(content)
}

fn description_block(document: &Html, site_root: &Url) -> Option<String> {
    let element = first_matching_all(document, &DESCRIPTIONS).into_iter().next()?;
    let inner = rewrite_inner_html(element, site_root);
    if inner.trim().is_empty() {
        return None;
    }
    Some(format!(
        "<div class=\"{DESCRIPTION_WRAPPER_CLASS}\">{inner}</div>"
    ))
}

/// Whether an ancestor of `element` also matches `selector`. Nested matches
/// are already serialized as part of their ancestor.
fn nested_in_match(element: ElementRef<'_>, selector: &Selector) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| selector.matches(&a))
}
