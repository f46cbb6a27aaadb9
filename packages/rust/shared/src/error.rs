//! Error types for FAQBot.
//!
//! Library crates use [`FaqbotError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Crawl failures come in two sizes. Page-level failures ([`FaqbotError::Fetch`],
//! [`FaqbotError::ExtractionTooThin`]) are recovered inside a whole-site crawl
//! and only surface as warnings; job-level failures ([`FaqbotError::InvalidInput`],
//! [`FaqbotError::NoContentExtracted`]) end the crawl.

use std::path::PathBuf;

/// Top-level error type for all FAQBot operations.
#[derive(Debug, thiserror::Error)]
pub enum FaqbotError {
    /// Malformed URL, missing field, or an entry that breaks its invariants.
    /// Raised before any network or AI call is made.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Network error, timeout, or non-2xx response while fetching a page.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The page was fetched but yielded too little text to be useful.
    #[error("not enough content at {url}: extracted {chars} characters")]
    ExtractionTooThin { url: String, chars: usize },

    /// The text-generation service errored, returned nothing, or returned
    /// nothing that survived validation.
    #[error("generation error: {0}")]
    Generation(String),

    /// A whole-site crawl finished without a single usable page.
    #[error("no content could be extracted ({pages_visited} pages visited)")]
    NoContentExtracted { pages_visited: usize },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON/HTML parsing error outside the generation path.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FaqbotError>;

impl FaqbotError {
    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a fetch error for `url`.
    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a generation error from any displayable message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a whole-site crawl may log this error and move on to the next page.
    pub fn is_page_level(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::ExtractionTooThin { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FaqbotError::invalid_input("URL is required");
        assert_eq!(err.to_string(), "invalid input: URL is required");

        let err = FaqbotError::ExtractionTooThin {
            url: "https://example.com/".into(),
            chars: 50,
        };
        assert!(err.to_string().contains("50 characters"));
    }

    #[test]
    fn page_level_classification() {
        assert!(FaqbotError::fetch("https://example.com", "HTTP 404").is_page_level());
        assert!(
            FaqbotError::ExtractionTooThin {
                url: "https://example.com".into(),
                chars: 3
            }
            .is_page_level()
        );
        assert!(!FaqbotError::NoContentExtracted { pages_visited: 4 }.is_page_level());
        assert!(!FaqbotError::generation("empty response").is_page_level());
    }
}
