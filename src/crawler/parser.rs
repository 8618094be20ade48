//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Basic page metadata (title, description, keywords, author, language, Open Graph)
//! - The visible main text handed to the indexing sink
//!
//! Non-content elements (scripts, styles, navigation, footers, iframes) are
//! ignored for both link and text extraction.

use crate::url::is_binary_asset;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Elements whose subtrees never contribute links or text
const NON_CONTENT_ELEMENTS: &[&str] = &[
    "script", "style", "nav", "footer", "iframe", "noscript", "template",
];

/// Metadata extracted from a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// `<meta name="description">`
    pub description: Option<String>,

    /// `<meta name="keywords">`
    pub keywords: Option<String>,

    /// `<meta name="author">`
    pub author: Option<String>,

    /// `<html lang="...">`
    pub language: Option<String>,

    /// All `<meta property="og:*">` values keyed by property
    pub open_graph: BTreeMap<String, String>,

    /// Visible text of the main content area
    pub text: String,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub metadata: PageMetadata,

    /// Links found on the page (absolute, deduplicated, in document order)
    pub links: Vec<Url>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags outside non-content elements
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - Links inside `<script>`, `<style>`, `<nav>`, `<footer>`, `<iframe>`, `<noscript>`
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:`, `data:` links and fragment-only links
/// - Non-HTTP(S) URLs after resolution
/// - Binary assets (`.pdf`, images, archives, ...)
///
/// # Example
///
/// ```
/// use nova_crawler::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.metadata.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let metadata = PageMetadata {
        title: extract_title(&document),
        description: meta_content(&document, "meta[name='description']"),
        keywords: meta_content(&document, "meta[name='keywords']"),
        author: meta_content(&document, "meta[name='author']"),
        language: extract_language(&document),
        open_graph: extract_open_graph(&document),
        text: extract_main_text(&document),
    };

    let links = extract_links(&document, base_url);

    ParsedPage { metadata, links }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_language(document: &Html) -> Option<String> {
    document
        .root_element()
        .value()
        .attr("lang")
        .map(|lang| lang.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_open_graph(document: &Html) -> BTreeMap<String, String> {
    let mut open_graph = BTreeMap::new();

    if let Ok(selector) = Selector::parse("meta[property^='og:']") {
        for element in document.select(&selector) {
            if let (Some(property), Some(content)) = (
                element.value().attr("property"),
                element.value().attr("content"),
            ) {
                open_graph.insert(property.to_string(), content.trim().to_string());
            }
        }
    }

    open_graph
}

/// Collects the visible text of `<main>`, else `<article>`, else `<body>`
fn extract_main_text(document: &Html) -> String {
    let container = ["main", "article", "body"].iter().find_map(|name| {
        Selector::parse(name)
            .ok()
            .and_then(|selector| document.select(&selector).next())
    });

    let container = match container {
        Some(element) => element,
        None => document.root_element(),
    };

    let mut words: Vec<&str> = Vec::new();
    for node in container.descendants() {
        if let Node::Text(text) = node.value() {
            let inside_non_content = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|element| NON_CONTENT_ELEMENTS.contains(&element.name()))
                    .unwrap_or(false)
            });

            if !inside_non_content {
                words.extend(text.split_whitespace());
            }
        }
    }

    words.join(" ")
}

/// Returns true if the element or one of its ancestors is a non-content element
fn in_non_content(element: &ElementRef) -> bool {
    if NON_CONTENT_ELEMENTS.contains(&element.value().name()) {
        return true;
    }

    element.ancestors().any(|ancestor| {
        ancestor
            .value()
            .as_element()
            .map(|element| NON_CONTENT_ELEMENTS.contains(&element.name()))
            .unwrap_or(false)
    })
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |url: Url| {
        if seen.insert(url.as_str().to_string()) {
            links.push(url);
        }
    };

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() || in_non_content(&element) {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    push(absolute_url);
                }
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel:, data: schemes
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
/// - Binary assets
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }

    if is_binary_asset(&absolute_url) {
        return None;
    }

    absolute_url.set_fragment(None);
    Some(absolute_url)
}
