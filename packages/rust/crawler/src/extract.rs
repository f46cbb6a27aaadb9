//! Boilerplate-free text, metadata, and outbound-link extraction from raw HTML.

use std::collections::HashSet;
use std::sync::LazyLock;

use faqbot_shared::{FaqbotError, Result};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::links::{is_asset_path, normalize_url};

/// Elements whose whole subtree is dropped before text extraction.
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "iframe", "svg", "noscript",
];

/// Containers tried in order for the page's main text.
const MAIN_CONTAINERS: &[&str] = &["article", "main", "body"];

pub const DEFAULT_MAX_TEXT_CHARS: usize = 6000;
pub const DEFAULT_MIN_TEXT_CHARS: usize = 100;
pub const DEFAULT_MAX_LINKS: usize = 20;

static TITLE: LazyLock<Selector> = LazyLock::new(|| css("title"));
static H1: LazyLock<Selector> = LazyLock::new(|| css("h1"));
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| css(r#"meta[name="description"]"#));
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| css(r#"meta[property="og:description"]"#));
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| css("a[href]"));

fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector is valid")
}

/// What a single HTML page boils down to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// Document `<title>`, else the first `<h1>`, else empty. Titles inside
    /// boilerplate such as inline `<svg>` icons are ignored.
    pub title: String,
    pub description: String,
    /// Whitespace-collapsed main text, capped at the extractor's limit.
    pub main_text: String,
    /// Same-host, fragment-free, non-asset links in document order.
    pub links: Vec<Url>,
}

/// Extracts normalized text and crawlable links from HTML.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    max_text_chars: usize,
    min_text_chars: usize,
    max_links: usize,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

impl ContentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap on links returned per page.
    pub fn with_max_links(mut self, max_links: usize) -> Self {
        self.max_links = max_links;
        self
    }

    /// Extract a page. Fails with [`FaqbotError::ExtractionTooThin`] when the
    /// main text is shorter than the minimum, instead of returning a near-empty
    /// page.
    pub fn extract(&self, html: &str, base_url: &Url) -> Result<ExtractedPage> {
        let doc = Html::parse_document(html);

        let main_text = truncate_chars(&main_text(&doc), self.max_text_chars);
        let chars = main_text.chars().count();
        if chars < self.min_text_chars {
            return Err(FaqbotError::ExtractionTooThin {
                url: base_url.to_string(),
                chars,
            });
        }

        Ok(ExtractedPage {
            title: title(&doc),
            description: description(&doc),
            main_text,
            links: self.links(&doc, base_url),
        })
    }

    /// Resolve anchors against `base_url`, keeping only crawlable pages on the
    /// same host. Navigation menus are included: they are where most of a
    /// site's internal links live. Links are rewritten to `base_url`'s scheme
    /// so `http://` and `https://` copies of a page dedupe to one.
    fn links(&self, doc: &Html, base_url: &Url) -> Vec<Url> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for el in doc.select(&ANCHORS) {
            if links.len() >= self.max_links {
                break;
            }
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            let lower = href.to_ascii_lowercase();
            if href.is_empty()
                || href.starts_with('#')
                || lower.starts_with("javascript:")
                || lower.starts_with("mailto:")
                || lower.starts_with("tel:")
                || lower.starts_with("data:")
            {
                continue;
            }

            let Ok(mut resolved) = base_url.join(href) else {
                continue;
            };
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                continue;
            }
            if resolved.host_str() != base_url.host_str() {
                continue;
            }
            if resolved.scheme() != base_url.scheme()
                && resolved.set_scheme(base_url.scheme()).is_err()
            {
                continue;
            }
            resolved.set_fragment(None);
            if is_asset_path(resolved.path()) {
                continue;
            }

            if seen.insert(normalize_url(&resolved)) {
                links.push(resolved);
            }
        }

        links
    }
}

fn is_boilerplate(tag: &str) -> bool {
    BOILERPLATE_TAGS.contains(&tag)
}

fn inside_boilerplate(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_boilerplate(a.value().name()))
}

/// Concatenate descendant text, skipping boilerplate subtrees.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !is_boilerplate(child_el.value().name()) {
                        collect_text(child_el, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn main_text(doc: &Html) -> String {
    for tag in MAIN_CONTAINERS {
        let sel = css(tag);
        let containers: Vec<ElementRef<'_>> = doc
            .select(&sel)
            .filter(|el| !inside_boilerplate(*el))
            .collect();
        if containers.is_empty() {
            continue;
        }

        let mut raw = String::new();
        for el in containers {
            collect_text(el, &mut raw);
            raw.push(' ');
        }
        return collapse_whitespace(&raw);
    }
    String::new()
}

fn title(doc: &Html) -> String {
    let from_title = doc
        .select(&TITLE)
        .find(|el| !inside_boilerplate(*el))
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());
    if let Some(title) = from_title {
        return title;
    }

    doc.select(&H1)
        .filter(|el| !inside_boilerplate(*el))
        .map(|el| {
            let mut raw = String::new();
            collect_text(el, &mut raw);
            collapse_whitespace(&raw)
        })
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn description(doc: &Html) -> String {
    [&*META_DESCRIPTION, &*OG_DESCRIPTION]
        .into_iter()
        .filter_map(|sel| doc.select(sel).next())
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|d| !d.is_empty())
        .unwrap_or_default()
}

/// Collapse whitespace runs to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max` characters (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
