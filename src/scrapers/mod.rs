//! HTML extraction for listing and article pages.
//!
//! The origin's markup drifts between templates, so every lookup is a
//! cascade: an ordered table of CSS selectors tried from most to least
//! specific, where the first selector that yields something wins.
//!
//! | Module | Input | Output |
//! |--------|-------|--------|
//! | [`listing`] | category listing page | `Vec<ArticleSummary>` |
//! | [`article`] | article detail page | sanitized HTML body |
//! | [`rewrite`] | one body element | serialized, rewritten HTML |

pub mod article;
pub mod listing;
pub mod rewrite;

use scraper::{ElementRef, Html, Selector};

/// Compile a static selector table.
///
/// Tables are literals checked by tests, so a selector that fails to parse
/// is dropped rather than aborting the crawl.
pub(crate) fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

/// All matches of the first selector in `table` that matches anything in
/// the document.
pub(crate) fn first_matching_all<'a>(document: &'a Html, table: &[Selector]) -> Vec<ElementRef<'a>> {
    table
        .iter()
        .map(|sel| document.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

/// First element under `scope` matched by the first selector in `table`
/// that yields `Some` from `pick`.
pub(crate) fn first_within<'a, T>(
    scope: ElementRef<'a>,
    table: &[Selector],
    pick: impl FnMut(ElementRef<'a>) -> Option<T>,
) -> Option<T> {
    table
        .iter()
        .filter_map(|sel| scope.select(sel).next())
        .find_map(pick)
}

/// Concatenated text of an element.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Attribute value, treating empty or blank values as absent.
pub(crate) fn non_empty_attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element
        .value()
        .attr(name)
        .filter(|v| !v.trim().is_empty())
}
