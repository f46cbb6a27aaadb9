//! URL helpers: seed validation, dedup keys, and static-asset filtering.

use faqbot_shared::{FaqbotError, Result};
use url::Url;

/// Path extensions that never lead to crawlable HTML.
const ASSET_EXTENSIONS: &[&str] = &[
    // images and icons
    "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "tif", "tiff", "avif",
    // archives and binaries
    "zip", "tar", "gz", "tgz", "bz2", "xz", "rar", "7z", "exe", "dmg", "iso", "apk",
    // stylesheets, scripts, source maps
    "css", "js", "mjs", "map",
    // feeds and data
    "xml", "rss", "atom", "json",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // media
    "mp3", "mp4", "wav", "ogg", "webm", "avi", "mov",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
];

/// Validate and normalize an operator-supplied seed URL.
///
/// A missing scheme defaults to `https://`. Only http(s) URLs with a host are
/// accepted.
pub fn parse_seed_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FaqbotError::invalid_input("URL is required"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| FaqbotError::invalid_input(format!("invalid URL {trimmed:?}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FaqbotError::invalid_input(format!(
            "unsupported URL scheme {:?}; use http or https",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(FaqbotError::invalid_input(format!("URL {trimmed:?} has no host")));
    }

    Ok(url)
}

/// Normalize a URL for deduplication (strip fragment and trailing slash).
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    // Remove trailing slash for consistency (except root path)
    if s.ends_with('/') && normalized.path() != "/" {
        s.pop();
    }
    s
}

/// Whether the URL path ends in a static-asset extension.
pub fn is_asset_path(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            ASSET_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}
