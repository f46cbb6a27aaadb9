//! Budgeted, sequential breadth-first crawler.
//!
//! The crawler starts from a seed URL and either fetches that single page or
//! walks same-host links breadth-first until the page budget is spent, the
//! queue runs dry, or a stop is requested. Every successfully extracted page
//! is appended to the store as a [`faqbot_shared::CrawledPage`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use faqbot_shared::{ChatbotId, CrawlConfig, FaqbotError, NewCrawledPage, Result};
use faqbot_storage::KnowledgeStore;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::extract::{ContentExtractor, ExtractedPage};
use crate::fetch::{FetchOptions, HttpFetcher, PageFetcher, fetch_and_extract};
use crate::links::normalize_url;

// ---------------------------------------------------------------------------
// Modes, stop flag, observer
// ---------------------------------------------------------------------------

/// How far a crawl reaches from its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Only the seed URL.
    SinglePage,
    /// Breadth-first over same-host links, bounded by the page budget.
    WholeSite,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinglePage => "single_page",
            Self::WholeSite => "whole_site",
        }
    }
}

impl std::fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative stop flag shared between a running crawl and whoever may
/// cancel it. Checked once per loop iteration; in-flight fetches finish.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callbacks. All methods default to no-ops.
pub trait CrawlObserver: Send + Sync {
    fn page_started(&self, _url: &Url, _visited: usize, _budget: usize) {}
    fn page_collected(&self, _page: &CollectedPage) {}
    fn page_failed(&self, _url: &Url, _error: &FaqbotError) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CrawlObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Content kept from one successfully extracted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedPage {
    pub url: String,
    pub title: String,
    pub description: String,
    pub content: String,
}

/// A page that failed during a whole-site crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlWarning {
    pub url: String,
    pub message: String,
}

/// Outcome of the traversal phase.
#[derive(Debug, Clone)]
pub struct Traversal {
    /// Distinct URLs attempted, successful or not.
    pub pages_visited: usize,
    pub collected: Vec<CollectedPage>,
    pub warnings: Vec<CrawlWarning>,
    /// Whether the loop ended because a stop was requested.
    pub stopped: bool,
    pub elapsed: Duration,
}

/// Per-call crawl state. Never shared across calls.
struct CrawlJob {
    queue: VecDeque<Url>,
    /// Dedup keys of URLs already fetched.
    visited: HashSet<String>,
    /// Dedup keys of URLs ever enqueued.
    queued: HashSet<String>,
    collected: Vec<CollectedPage>,
    warnings: Vec<CrawlWarning>,
    budget: usize,
}

impl CrawlJob {
    fn new(seed: &Url, budget: usize) -> Self {
        let mut job = Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            queued: HashSet::new(),
            collected: Vec::new(),
            warnings: Vec::new(),
            budget,
        };
        job.enqueue(seed.clone());
        job
    }

    fn enqueue(&mut self, url: Url) {
        let key = normalize_url(&url);
        if !self.visited.contains(&key) && self.queued.insert(key) {
            self.queue.push_back(url);
        }
    }

    fn has_capacity(&self) -> bool {
        self.visited.len() < self.budget
    }

    fn has_more_work(&self) -> bool {
        !self.queue.is_empty() && self.has_capacity()
    }
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Sequential crawler: one fetch in flight at a time.
pub struct Crawler {
    config: CrawlConfig,
    fetcher: Arc<dyn PageFetcher>,
    extractor: ContentExtractor,
}

impl Crawler {
    /// Create a crawler backed by a real HTTP client.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        Ok(Self::with_fetcher(config, Arc::new(HttpFetcher::new()?)))
    }

    /// Create a crawler over any [`PageFetcher`].
    pub fn with_fetcher(config: CrawlConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        let extractor = ContentExtractor::new().with_max_links(config.max_links_per_page);
        Self {
            config,
            fetcher,
            extractor,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: self.config.fetch_timeout,
            user_agent: self.config.user_agent.clone(),
        }
    }

    /// Traverse from `seed` and persist each extracted page.
    ///
    /// In [`CrawlMode::SinglePage`] any fetch or extraction failure is
    /// returned. In [`CrawlMode::WholeSite`] page failures become warnings and
    /// the walk continues; an empty result is not an error at this level.
    #[instrument(skip_all, fields(seed = %seed, mode = %mode, chatbot_id = %chatbot_id))]
    pub async fn crawl(
        &self,
        seed: &Url,
        mode: CrawlMode,
        chatbot_id: &ChatbotId,
        store: &dyn KnowledgeStore,
        stop: &StopHandle,
        observer: &(impl CrawlObserver + ?Sized),
    ) -> Result<Traversal> {
        let started = Instant::now();
        let budget = match mode {
            CrawlMode::SinglePage => 1,
            CrawlMode::WholeSite => self.config.page_budget,
        };

        info!(
            budget,
            delay_ms = self.config.delay.as_millis() as u64,
            "starting crawl"
        );

        let mut job = CrawlJob::new(seed, budget);
        let opts = self.fetch_options();

        if mode == CrawlMode::SinglePage {
            job.visited.insert(normalize_url(seed));
            observer.page_started(seed, 1, budget);

            let page = match fetch_and_extract(self.fetcher.as_ref(), &self.extractor, seed, &opts)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    observer.page_failed(seed, &e);
                    return Err(e);
                }
            };
            let collected = self.keep(seed, page, chatbot_id, store).await;
            observer.page_collected(&collected);
            job.collected.push(collected);
        } else {
            while !stop.is_stopped() {
                let Some(url) = job.queue.pop_front() else {
                    break;
                };
                if !job.has_capacity() {
                    break;
                }
                let key = normalize_url(&url);
                if !job.visited.insert(key) {
                    continue;
                }

                observer.page_started(&url, job.visited.len(), budget);

                match fetch_and_extract(self.fetcher.as_ref(), &self.extractor, &url, &opts).await
                {
                    Ok(page) => {
                        let links = page.links.clone();
                        let collected = self.keep(&url, page, chatbot_id, store).await;
                        observer.page_collected(&collected);
                        job.collected.push(collected);
                        for link in links {
                            job.enqueue(link);
                        }
                    }
                    Err(e) => {
                        warn!(%url, error = %e, "page failed, continuing");
                        observer.page_failed(&url, &e);
                        job.warnings.push(CrawlWarning {
                            url: url.to_string(),
                            message: e.to_string(),
                        });
                    }
                }

                if job.has_more_work() && !stop.is_stopped() && !self.config.delay.is_zero() {
                    tokio::time::sleep(self.config.delay).await;
                }
            }
        }

        let traversal = Traversal {
            pages_visited: job.visited.len(),
            collected: job.collected,
            warnings: job.warnings,
            stopped: stop.is_stopped(),
            elapsed: started.elapsed(),
        };

        info!(
            pages_visited = traversal.pages_visited,
            pages_collected = traversal.collected.len(),
            warnings = traversal.warnings.len(),
            stopped = traversal.stopped,
            duration_ms = traversal.elapsed.as_millis() as u64,
            "crawl traversal finished"
        );

        Ok(traversal)
    }

    /// Persist an extracted page and convert it for summarization. Store
    /// failures are logged, never fatal.
    async fn keep(
        &self,
        url: &Url,
        page: ExtractedPage,
        chatbot_id: &ChatbotId,
        store: &dyn KnowledgeStore,
    ) -> CollectedPage {
        let record = NewCrawledPage {
            url: url.to_string(),
            raw_text: page.main_text.clone(),
            title: non_empty(&page.title),
            description: non_empty(&page.description),
        };
        match store.save_crawled_page(chatbot_id, &record).await {
            Ok(saved) => debug!(%url, page_id = %saved.id, "crawled page saved"),
            Err(e) => warn!(%url, error = %e, "failed to save crawled page"),
        }

        CollectedPage {
            url: url.to_string(),
            title: page.title,
            description: page.description,
            content: page.main_text,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
