//! Web crawling for FAQBot knowledge bases.
//!
//! This crate provides:
//! - [`extract`]: boilerplate-free text, metadata and link extraction from HTML
//! - [`fetch`]: the [`PageFetcher`] collaborator and its reqwest implementation
//! - [`engine`]: sequential, budgeted breadth-first crawler
//! - [`links`]: seed validation and URL dedup helpers

pub mod engine;
pub mod extract;
pub mod fetch;
pub mod links;

pub use engine::{
    CollectedPage, CrawlMode, CrawlObserver, CrawlWarning, Crawler, NoopObserver, StopHandle,
    Traversal,
};
pub use extract::{ContentExtractor, ExtractedPage, collapse_whitespace, truncate_chars};
pub use fetch::{FetchOptions, FetchResponse, HttpFetcher, PageFetcher, fetch_and_extract};
pub use links::{normalize_url, parse_seed_url};
