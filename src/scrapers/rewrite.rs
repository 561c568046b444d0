//! Rewriting serializer for article bodies.
//!
//! `scraper` trees are immutable, so the body is rewritten while it is
//! serialized: every element is emitted with adjusted attributes, and
//! removed elements are skipped together with their subtree.
//!
//! Rules:
//! - `img`: source resolved from `data-src`, `src`, `data-original`; made
//!   absolute; deferred-load and source-set attributes dropped;
//!   `class="img-fluid"` and `loading="lazy"` forced
//! - `figure` gets the `figure` class; captions inside a figure get
//!   `figure-caption text-center fst-italic`
//! - `video`, `iframe`, embedded video boxes, video-stream markers,
//!   `script`, `object`, `embed` and `form` are removed
//! - `img` without a resolvable `http(s)` source is removed
//! - `a[href]` is made absolute; an `href` whose resolved scheme is not
//!   `http`, `https`, `mailto` or `tel` is dropped
//! - inline `on*` handlers and comments are dropped

use super::compile;
use crate::utils::{normalize_image_url, normalize_link_url};
use html_escape::{encode_double_quoted_attribute, encode_text};
use once_cell::sync::Lazy;
use scraper::node::Node;
use scraper::{ElementRef, Selector};
use url::Url;

pub(crate) const REMOVED_SELECTORS: &[&str] = &[
    "video",
    "iframe",
    ".box_embed_video",
    r#"[type="VideoStream"]"#,
    "script",
    "object",
    "embed",
    "form",
];
pub(crate) const CAPTION_SELECTORS: &[&str] = &["figcaption", ".image_caption"];

pub const IMAGE_CLASS: &str = "img-fluid";
pub const FIGURE_CLASS: &str = "figure";
pub const CAPTION_CLASSES: &str = "figure-caption text-center fst-italic";

/// Schemes a rewritten link may keep. Checked after resolution, since URL
/// parsing strips tabs and newlines that hide a scheme from a raw check.
const LINK_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];
const IMAGE_SCHEMES: &[&str] = &["http", "https"];

/// Image source attributes in the order they are trusted.
const IMAGE_SOURCE_ATTRS: &[&str] = &["data-src", "src", "data-original"];
/// Attributes dropped from every image once its source is resolved.
const IMAGE_DROPPED_ATTRS: &[&str] = &[
    "src",
    "data-src",
    "data-original",
    "data-srcset",
    "srcset",
    "class",
    "loading",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "xmp", "noscript"];

static REMOVED: Lazy<Vec<Selector>> = Lazy::new(|| compile(REMOVED_SELECTORS));
static CAPTIONS: Lazy<Vec<Selector>> = Lazy::new(|| compile(CAPTION_SELECTORS));

/// Serialize the children of `element` with the body rewrite rules applied.
pub fn rewrite_inner_html(element: ElementRef<'_>, site_root: &Url) -> String {
    let mut out = String::new();
    write_children(element, site_root, &mut out);
    out
}

fn write_children(element: ElementRef<'_>, site_root: &Url, out: &mut String) {
    let raw_text = RAW_TEXT_ELEMENTS.contains(&element.value().name());
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let text: &str = text;
                if raw_text {
                    out.push_str(text);
                } else {
                    out.push_str(&encode_text(text));
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, site_root, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, site_root: &Url, out: &mut String) {
    if is_removed(element) {
        return;
    }

    let name = element.value().name();
    let attrs = match name {
        "img" => match image_attrs(element, site_root) {
            Some(attrs) => attrs,
            None => return,
        },
        "a" => link_attrs(element, site_root),
        "figure" => with_class(element, FIGURE_CLASS),
        _ if is_caption_in_figure(element) => with_class(element, CAPTION_CLASSES),
        _ => plain_attrs(element),
    };

    out.push('<');
    out.push_str(name);
    for (key, value) in &attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&encode_double_quoted_attribute(value));
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }
    write_children(element, site_root, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn is_removed(element: ElementRef<'_>) -> bool {
    REMOVED.iter().any(|sel| sel.matches(&element))
}

fn is_caption_in_figure(element: ElementRef<'_>) -> bool {
    CAPTIONS.iter().any(|sel| sel.matches(&element))
        && element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().name() == "figure")
}

fn has_scheme(url: &str, allowed: &[&str]) -> bool {
    Url::parse(url).is_ok_and(|u| allowed.contains(&u.scheme()))
}

fn is_event_handler(name: &str) -> bool {
    name.len() > 2 && name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on"))
}

/// Source attributes with event handlers removed.
fn plain_attrs(element: ElementRef<'_>) -> Vec<(String, String)> {
    element
        .value()
        .attrs()
        .filter(|(k, _)| !is_event_handler(k))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn with_class(element: ElementRef<'_>, extra: &str) -> Vec<(String, String)> {
    let mut attrs: Vec<(String, String)> = plain_attrs(element)
        .into_iter()
        .filter(|(k, _)| k != "class")
        .collect();
    let existing = element.value().classes().collect::<Vec<_>>();
    let mut classes: Vec<&str> = existing.clone();
    for class in extra.split_whitespace() {
        if !existing.contains(&class) {
            classes.push(class);
        }
    }
    attrs.push(("class".to_string(), classes.join(" ")));
    attrs
}

/// Rewritten image attributes, or `None` when no source resolves to a web URL.
fn image_attrs(element: ElementRef<'_>, site_root: &Url) -> Option<Vec<(String, String)>> {
    let src = IMAGE_SOURCE_ATTRS
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .find(|v| !v.trim().is_empty())
        .and_then(|raw| normalize_image_url(raw, site_root))
        .filter(|url| has_scheme(url, IMAGE_SCHEMES))?;

    let mut attrs: Vec<(String, String)> = plain_attrs(element)
        .into_iter()
        .filter(|(k, _)| !IMAGE_DROPPED_ATTRS.contains(&k.as_str()))
        .collect();
    attrs.push(("src".to_string(), src));
    attrs.push(("class".to_string(), IMAGE_CLASS.to_string()));
    attrs.push(("loading".to_string(), "lazy".to_string()));
    Some(attrs)
}

fn link_attrs(element: ElementRef<'_>, site_root: &Url) -> Vec<(String, String)> {
    plain_attrs(element)
        .into_iter()
        .filter_map(|(k, v)| {
            if k != "href" {
                return Some((k, v));
            }
            normalize_link_url(&v, site_root)
                .filter(|url| has_scheme(url, LINK_SCHEMES))
                .map(|url| (k, url))
        })
        .collect()
}
