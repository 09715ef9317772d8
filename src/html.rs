//! Small helpers around `scraper` shared by traversal and extractors.
//!
//! `scraper::Html` is not `Send`, so documents are always parsed and queried
//! inside synchronous functions and only owned data leaves them.

use scraper::{ElementRef, Selector};

/// Parses a selector literal.
///
/// Only used with selectors written in this crate, which are known to parse.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e}"))
}

/// Text content of an element with whitespace collapsed
pub(crate) fn text_of(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Attribute value of an element, trimmed, `None` when absent or empty
pub(crate) fn attr_of(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The parent element, if the parent node is an element
pub(crate) fn parent_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.parent().and_then(ElementRef::wrap)
}

/// The closest preceding sibling that is an element
pub(crate) fn previous_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.prev_siblings().find_map(ElementRef::wrap)
}

/// Following sibling elements, skipping text and comment nodes
pub(crate) fn next_elements<'a>(
    element: &ElementRef<'a>,
) -> impl Iterator<Item = ElementRef<'a>> {
    element.next_siblings().filter_map(ElementRef::wrap)
}

/// Resolves `href` against `base`, returning `None` for unusable input
pub(crate) fn absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    url::Url::parse(base)
        .and_then(|base| base.join(href))
        .or_else(|_| url::Url::parse(href))
        .ok()
        .map(String::from)
}

/// Case-insensitive substring test
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
