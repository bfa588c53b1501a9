//! Page extraction: title, snippet, and outbound links
//!
//! Parsing is CPU-bound and the parsed DOM is not `Send`, so callers run
//! this on a blocking thread and get back owned data.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::util::{collapse_whitespace, truncate_with_ellipsis};

/// Maximum snippet size in bytes before the ellipsis marker is appended.
pub const SNIPPET_MAX_BYTES: usize = 500;

/// Owned extraction result for one page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub title: String,
    pub snippet: String,
    pub links: Vec<Url>,
}

/// Parse a page and pull out its title, snippet and resolved links.
///
/// Title is the first non-empty of `<title>`, `<h1>`. Snippet is the first
/// non-empty of the meta description and the first `<p>`, truncated to
/// [`SNIPPET_MAX_BYTES`]. Links are `a[href]` resolved against `base`,
/// restricted to http(s) and deduplicated within the page.
pub fn extract_page(body: &str, base: &Url) -> ExtractedPage {
    let document = Html::parse_document(body);

    ExtractedPage {
        title: extract_title(&document),
        snippet: extract_snippet(&document),
        links: extract_links(&document, base),
    }
}

fn extract_title(document: &Html) -> String {
    for css in ["title", "h1"] {
        if let Some(text) = first_text(document, css) {
            return text;
        }
    }
    String::new()
}

fn extract_snippet(document: &Html) -> String {
    let raw = meta_description(document)
        .or_else(|| first_text(document, "p"))
        .unwrap_or_default();
    truncate_with_ellipsis(&raw, SNIPPET_MAX_BYTES)
}

fn extract_links(document: &Html, base: &Url) -> Vec<Url> {
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if (resolved.scheme() == "http" || resolved.scheme() == "https")
            && seen.insert(resolved.as_str().to_string())
        {
            links.push(resolved);
        }
    }
    links
}

/// First element matching `css` with non-empty collapsed text.
fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    for element in document.select(&selector) {
        let text = collapse_whitespace(&element.text().collect::<String>());
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

fn meta_description(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="description"]"#).ok()?;
    for element in document.select(&selector) {
        if let Some(content) = element.value().attr("content") {
            let content = collapse_whitespace(content);
            if !content.is_empty() {
                return Some(content);
            }
        }
    }
    None
}
