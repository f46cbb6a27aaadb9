//! HTTP fetch collaborator.

use std::time::Duration;

use async_trait::async_trait;
use faqbot_shared::{DEFAULT_USER_AGENT, FaqbotError, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::extract::{ContentExtractor, ExtractedPage};

/// Per-request fetch settings.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches a URL. Transport failures and timeouts are errors; a non-2xx
/// status is returned as a normal response for the caller to judge.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<FetchResponse>;
}

/// [`PageFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FaqbotError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<FetchResponse> {
        debug!(%url, "fetching page");

        let response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::USER_AGENT, opts.user_agent.as_str())
            .timeout(opts.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FaqbotError::fetch(
                        url.as_str(),
                        format!("timed out after {}s", opts.timeout.as_secs()),
                    )
                } else {
                    FaqbotError::fetch(url.as_str(), e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FaqbotError::fetch(url.as_str(), format!("body read failed: {e}")))?;

        Ok(FetchResponse { status, body })
    }
}

/// Fetch a page and extract it. A non-2xx status becomes
/// [`FaqbotError::Fetch`].
pub async fn fetch_and_extract(
    fetcher: &dyn PageFetcher,
    extractor: &ContentExtractor,
    url: &Url,
    opts: &FetchOptions,
) -> Result<ExtractedPage> {
    let response = fetcher.fetch(url, opts).await?;
    if !response.is_success() {
        return Err(FaqbotError::fetch(
            url.as_str(),
            format!("HTTP {}", response.status),
        ));
    }
    extractor.extract(&response.body, url)
}
