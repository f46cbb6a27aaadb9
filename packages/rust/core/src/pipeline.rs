//! End-to-end crawl pipeline: seed URL → traversal → summarization → review.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{info, instrument, warn};

use faqbot_crawler::{
    CollectedPage, CrawlMode, CrawlObserver, CrawlWarning, Crawler, StopHandle, parse_seed_url,
    truncate_chars,
};
use faqbot_shared::{ChatbotId, FaqbotError, QaEntry, Result, StoredEntry, normalize_keywords};
use faqbot_storage::KnowledgeStore;

use crate::summarize::{SourcePage, SummaryGenerator, SummaryRequest};

/// Longest answer text taken from page content for a fallback entry.
const FALLBACK_ANSWER_CHARS: usize = 500;

/// Phases of a crawl job, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlPhase {
    Input,
    Crawling,
    Generating,
    Review,
}

impl std::fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Input => "Validating input",
            Self::Crawling => "Crawling",
            Self::Generating => "Generating FAQs",
            Self::Review => "Ready for review",
        };
        f.write_str(name)
    }
}

/// Progress callback for reporting pipeline status. Page-level events come
/// from [`CrawlObserver`].
pub trait ProgressReporter: CrawlObserver {
    /// Called when entering a new phase.
    fn phase(&self, phase: CrawlPhase);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl CrawlObserver for SilentProgress {}

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: CrawlPhase) {}
}

/// Result of a crawl job, ready for operator review.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub seed: String,
    pub mode: CrawlMode,
    pub pages_visited: usize,
    pub pages_collected: usize,
    /// Candidate entries awaiting selection. Nothing is stored yet.
    pub candidates: Vec<QaEntry>,
    /// Pages that failed during a whole-site crawl.
    pub warnings: Vec<CrawlWarning>,
    /// Set when summarization failed and the candidates are a fallback (or
    /// empty).
    pub generation_warning: Option<String>,
    pub stopped: bool,
    #[serde(rename = "elapsed_ms", serialize_with = "millis")]
    pub elapsed: Duration,
}

fn millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Drives one crawl job through its phases.
pub struct CrawlOrchestrator {
    crawler: Crawler,
    summarizer: SummaryGenerator,
    fallback_entry: bool,
}

impl CrawlOrchestrator {
    /// The crawler's config also decides the entry count and whether a
    /// fallback entry replaces a failed generation.
    pub fn new(crawler: Crawler, summarizer: SummaryGenerator) -> Self {
        let config = crawler.config();
        let fallback_entry = config.fallback_entry;
        let summarizer = summarizer.with_max_entries(config.max_questions);
        Self {
            crawler,
            summarizer,
            fallback_entry,
        }
    }

    /// Run a crawl job.
    ///
    /// Job-level failures are returned: a bad seed or unknown chatbot
    /// ([`FaqbotError::InvalidInput`]), a failed single page, or a whole-site
    /// crawl that collected nothing ([`FaqbotError::NoContentExtracted`]).
    /// A failed generation is not one of them; the report then carries a
    /// `generation_warning`.
    #[instrument(skip_all, fields(seed = %seed, mode = %mode, chatbot_id = %chatbot_id))]
    pub async fn run(
        &self,
        seed: &str,
        mode: CrawlMode,
        chatbot_id: &ChatbotId,
        store: &dyn KnowledgeStore,
        stop: &StopHandle,
        progress: &dyn ProgressReporter,
    ) -> Result<CrawlReport> {
        let start = Instant::now();

        // --- Phase 1: Input ---
        progress.phase(CrawlPhase::Input);
        let seed_url = parse_seed_url(seed)?;
        if store.get_chatbot(chatbot_id).await?.is_none() {
            return Err(FaqbotError::invalid_input(format!(
                "unknown chatbot {chatbot_id}"
            )));
        }

        // --- Phase 2: Crawling ---
        progress.phase(CrawlPhase::Crawling);
        let traversal = self
            .crawler
            .crawl(&seed_url, mode, chatbot_id, store, stop, progress)
            .await?;

        if traversal.collected.is_empty() {
            return Err(FaqbotError::NoContentExtracted {
                pages_visited: traversal.pages_visited,
            });
        }

        // --- Phase 3: Generating ---
        progress.phase(CrawlPhase::Generating);
        let request = summary_request(mode, &traversal.collected);
        let (candidates, generation_warning) = match self.summarizer.summarize(&request).await {
            Ok(entries) => (entries, None),
            Err(e) => {
                warn!(error = %e, fallback = self.fallback_entry, "generation failed");
                let candidates = if self.fallback_entry {
                    fallback_entry(&traversal.collected[0]).into_iter().collect()
                } else {
                    Vec::new()
                };
                (candidates, Some(e.to_string()))
            }
        };

        // --- Phase 4: Review ---
        progress.phase(CrawlPhase::Review);
        let report = CrawlReport {
            seed: seed_url.to_string(),
            mode,
            pages_visited: traversal.pages_visited,
            pages_collected: traversal.collected.len(),
            candidates,
            warnings: traversal.warnings,
            generation_warning,
            stopped: traversal.stopped,
            elapsed: start.elapsed(),
        };

        info!(
            pages_visited = report.pages_visited,
            pages_collected = report.pages_collected,
            candidates = report.candidates.len(),
            warnings = report.warnings.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "crawl job ready for review"
        );

        Ok(report)
    }
}

fn summary_request(mode: CrawlMode, collected: &[CollectedPage]) -> SummaryRequest {
    match (mode, collected) {
        (CrawlMode::SinglePage, [page, ..]) => SummaryRequest::Page {
            title: page.title.clone(),
            description: page.description.clone(),
            text: page.content.clone(),
        },
        _ => SummaryRequest::Site(
            collected
                .iter()
                .map(|p| SourcePage {
                    url: p.url.clone(),
                    title: p.title.clone(),
                    text: p.content.clone(),
                })
                .collect(),
        ),
    }
}

/// A single generic entry describing the first collected page.
fn fallback_entry(page: &CollectedPage) -> Option<QaEntry> {
    let question = if page.title.is_empty() {
        "What is this website about?".to_string()
    } else {
        format!("What is {}?", page.title)
    };
    let answer = if page.description.is_empty() {
        truncate_chars(&page.content, FALLBACK_ANSWER_CHARS)
    } else {
        page.description.clone()
    };

    let mut keywords = normalize_keywords(
        page.title
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() > 3),
    );
    for kw in ["about", "information"] {
        if !keywords.iter().any(|k| k == kw) {
            keywords.push(kw.to_string());
        }
    }

    QaEntry::new(question, answer, keywords).ok()
}

/// Persist the candidates at `selection` (indices into `report.candidates`).
///
/// Every index is checked before anything is written; duplicates are
/// committed once.
pub async fn commit_selected(
    store: &dyn KnowledgeStore,
    chatbot_id: &ChatbotId,
    report: &CrawlReport,
    selection: &[usize],
) -> Result<Vec<StoredEntry>> {
    let indices: BTreeSet<usize> = selection.iter().copied().collect();
    if let Some(bad) = indices.iter().find(|&&i| i >= report.candidates.len()) {
        return Err(FaqbotError::invalid_input(format!(
            "selection {bad} is out of range ({} candidates)",
            report.candidates.len()
        )));
    }

    let mut stored = Vec::with_capacity(indices.len());
    for i in indices {
        stored.push(store.create_entry(chatbot_id, &report.candidates[i]).await?);
    }
    info!(committed = stored.len(), %chatbot_id, "candidates committed");
    Ok(stored)
}
