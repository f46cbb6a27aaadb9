//! Turns extracted page text into candidate Q&A entries through a
//! [`TextGenerator`].
//!
//! The service is asked for a raw JSON array of `{question, answer, keywords}`
//! objects. Replies are parsed leniently (code fences, chatter around the
//! array) and validated strictly: anything that would not make a usable
//! [`QaEntry`] is dropped.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use faqbot_crawler::truncate_chars;
use faqbot_shared::{FaqbotError, QaEntry, Result, normalize_keywords};

use crate::llm::TextGenerator;

/// Entries requested per summarization call unless overridden.
pub const DEFAULT_MAX_ENTRIES: usize = 5;

/// Character cap on the concatenated sources of a site request.
pub const SITE_CONTENT_CHARS: usize = 30_000;

/// One collected page fed into a site-wide summary.
#[derive(Debug, Clone)]
pub struct SourcePage {
    pub url: String,
    pub title: String,
    pub text: String,
}

/// What to summarize.
#[derive(Debug, Clone)]
pub enum SummaryRequest {
    /// A single page with its metadata.
    Page {
        title: String,
        description: String,
        text: String,
    },
    /// Several pages summarized together in one call.
    Site(Vec<SourcePage>),
}

/// Builds prompts, calls the generator, and validates its output.
#[derive(Clone)]
pub struct SummaryGenerator {
    generator: Arc<dyn TextGenerator>,
    max_entries: usize,
}

impl SummaryGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Generate up to `max_entries` validated entries.
    ///
    /// Fails with [`FaqbotError::Generation`] when the service errors, returns
    /// nothing, returns something that is not a JSON array, or returns no
    /// element that passes validation.
    #[instrument(skip_all, fields(max_entries = self.max_entries))]
    pub async fn summarize(&self, request: &SummaryRequest) -> Result<Vec<QaEntry>> {
        let prompt = build_prompt(request, self.max_entries);
        debug!(prompt_chars = prompt.chars().count(), "requesting Q&A entries");

        let text = self.generator.generate(&prompt).await.map_err(|e| match e {
            FaqbotError::Generation(_) => e,
            other => FaqbotError::generation(other.to_string()),
        })?;

        parse_entries(&text, self.max_entries)
    }
}

/// Render the prompt for `request`.
pub fn build_prompt(request: &SummaryRequest, max_entries: usize) -> String {
    match request {
        SummaryRequest::Page {
            title,
            description,
            text,
        } => format!(
            "You are a helpful assistant that creates FAQ questions and answers based on website content.

Website Title: {title}
Description: {description}

Content:
{text}

Based on this content, generate exactly {max_entries} frequently asked questions with detailed answers. Focus on:
- Practical questions users would actually ask
- Clear, complete answers (2-4 sentences each)
- Relevant keywords for pattern matching (4-6 keywords per question)

{FORMAT_INSTRUCTIONS}

Make sure questions are specific to this website's content."
        ),
        SummaryRequest::Site(pages) => {
            let sources: String = pages
                .iter()
                .map(|page| {
                    format!(
                        "SOURCE: {}\nTITLE: {}\nCONTENT:\n{}\n---\n",
                        page.url, page.title, page.text
                    )
                })
                .collect();
            let sources = truncate_chars(&sources, SITE_CONTENT_CHARS);

            format!(
                "You are a helpful assistant that creates FAQ questions and answers for a website's support chatbot.

Below is content collected from {count} pages of the same website.

{sources}

Based on all of this content, generate the {max_entries} most useful frequently asked questions with clear answers (2-4 sentences each). Cover the whole site rather than a single page, and give each question 4-6 relevant keywords for pattern matching.

{FORMAT_INSTRUCTIONS}",
                count = pages.len(),
            )
        }
    }
}

const FORMAT_INSTRUCTIONS: &str = r#"Return ONLY valid JSON in this exact format (no markdown, no code blocks, just raw JSON):
[
  {
    "question": "Question here?",
    "answer": "Detailed answer here.",
    "keywords": ["keyword1", "keyword2", "keyword3", "keyword4"]
  }
]"#;

/// Parse a generator reply into at most `max` valid entries.
pub fn parse_entries(text: &str, max: usize) -> Result<Vec<QaEntry>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FaqbotError::generation("empty response"));
    }

    let value = parse_json_array(trimmed)
        .ok_or_else(|| FaqbotError::generation("response is not a JSON array"))?;
    let Value::Array(items) = value else {
        return Err(FaqbotError::generation("response is not a JSON array"));
    };

    let total = items.len();
    let entries: Vec<QaEntry> = items.iter().filter_map(entry_from_value).take(max).collect();

    if entries.len() < total.min(max) {
        warn!(
            received = total,
            kept = entries.len(),
            "dropped invalid generated entries"
        );
    }
    if entries.is_empty() {
        return Err(FaqbotError::generation("no valid entries in response"));
    }
    Ok(entries)
}

/// Try the reply as-is (minus code fences), then the outermost `[...]` slice.
fn parse_json_array(text: &str) -> Option<Value> {
    let unfenced = strip_code_fences(text);
    if let Ok(value @ Value::Array(_)) = serde_json::from_str::<Value>(unfenced) {
        return Some(value);
    }

    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn entry_from_value(value: &Value) -> Option<QaEntry> {
    let obj = value.as_object()?;
    let question = obj.get("question")?.as_str()?.trim();
    let answer = obj.get("answer")?.as_str()?.trim();
    let raw_keywords = obj.get("keywords")?.as_array()?;
    if question.is_empty() || answer.is_empty() {
        return None;
    }

    let mut keywords = normalize_keywords(raw_keywords.iter().filter_map(Value::as_str));
    if keywords.is_empty() {
        keywords = keywords_from_question(question);
    }
    QaEntry::new(question, answer, keywords).ok()
}

/// Question words longer than three characters, stripped of punctuation.
fn keywords_from_question(question: &str) -> Vec<String> {
    normalize_keywords(
        question
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() > 3),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    struct Canned {
        reply: Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(FaqbotError::generation(e.to_string())),
            }
        }
    }

    const TWO_ENTRIES: &str = r#"[
      {"question": "What are your hours?", "answer": "9-6 Mon-Fri.", "keywords": ["Hours", " open ", "schedule", "time"]},
      {"question": "Do you ship abroad?", "answer": "Yes, worldwide.", "keywords": ["shipping", "international", "abroad", "delivery"]}
    ]"#;

    #[test]
    fn parses_plain_array() {
        let entries = parse_entries(TWO_ENTRIES, 5).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].keywords, vec!["hours", "open", "schedule", "time"]);
    }

    #[test]
    fn strips_code_fences() {
        let fenced = format!("```json\n{TWO_ENTRIES}\n```");
        assert_eq!(parse_entries(&fenced, 5).unwrap().len(), 2);

        let bare = format!("```\n{TWO_ENTRIES}\n```");
        assert_eq!(parse_entries(&bare, 5).unwrap().len(), 2);
    }

    #[test]
    fn tolerates_surrounding_prose() {
        let chatty = format!("Sure! Here are your FAQs:\n{TWO_ENTRIES}\nLet me know if you need more.");
        assert_eq!(parse_entries(&chatty, 5).unwrap().len(), 2);
    }

    #[test]
    fn truncates_to_max() {
        assert_eq!(parse_entries(TWO_ENTRIES, 1).unwrap().len(), 1);
    }

    #[test]
    fn drops_invalid_elements() {
        let reply = r#"[
          {"question": "", "answer": "No question.", "keywords": ["x"]},
          {"question": "No answer?", "keywords": ["x"]},
          {"question": "Bad keywords?", "answer": "A.", "keywords": "x"},
          "not an object",
          {"question": "Returns?", "answer": "30 days.", "keywords": [1, "Returns", null, "  "]}
        ]"#;
        let entries = parse_entries(reply, 5).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].question, "Returns?");
        assert_eq!(entries[0].keywords, vec!["returns"]);
    }

    #[test]
    fn derives_keywords_from_question() {
        let reply = r#"[{"question": "Where is the store located?", "answer": "Main St.", "keywords": []}]"#;
        let entries = parse_entries(reply, 5).unwrap();
        assert_eq!(entries[0].keywords, vec!["where", "store", "located"]);

        let hopeless = r#"[{"question": "Why?", "answer": "Because.", "keywords": []}]"#;
        assert!(parse_entries(hopeless, 5).is_err());
    }

    #[test]
    fn caps_long_keywords() {
        let long = "k".repeat(70);
        let reply = format!(r#"[{{"question": "Q?", "answer": "A.", "keywords": ["{long}"]}}]"#);
        let entries = parse_entries(&reply, 5).unwrap();
        assert_eq!(entries[0].keywords[0].chars().count(), 50);
    }

    #[test]
    fn rejects_unusable_replies() {
        for reply in ["", "   ", "I cannot help with that.", "{\"question\": \"Q\"}", "[]"] {
            let err = parse_entries(reply, 5).unwrap_err();
            assert!(matches!(err, FaqbotError::Generation(_)), "reply {reply:?}");
        }
    }

    #[test]
    fn page_prompt_embeds_content() {
        let prompt = build_prompt(
            &SummaryRequest::Page {
                title: "Acme".into(),
                description: "Widgets".into(),
                text: "We sell widgets.".into(),
            },
            5,
        );
        assert!(prompt.contains("Website Title: Acme"));
        assert!(prompt.contains("Description: Widgets"));
        assert!(prompt.contains("exactly 5 frequently asked questions"));
        assert!(prompt.contains("4-6 keywords"));
    }

    #[test]
    fn site_prompt_lists_each_source_block() {
        let pages = vec![
            SourcePage {
                url: "https://example.com/".into(),
                title: "Home".into(),
                text: "We sell widgets.".into(),
            },
            SourcePage {
                url: "https://example.com/faq".into(),
                title: "FAQ".into(),
                text: "Shipping takes 3 days.".into(),
            },
        ];
        let prompt = build_prompt(&SummaryRequest::Site(pages), 5);
        assert!(prompt.contains("content collected from 2 pages"));
        assert!(prompt.contains(
            "SOURCE: https://example.com/\nTITLE: Home\nCONTENT:\nWe sell widgets.\n---\nSOURCE: https://example.com/faq\nTITLE: FAQ\n"
        ));
    }

    #[test]
    fn site_prompt_caps_sources() {
        let pages: Vec<SourcePage> = (0..10)
            .map(|i| SourcePage {
                url: format!("https://example.com/{i}"),
                title: format!("Page {i}"),
                text: "x".repeat(6000),
            })
            .collect();
        let prompt = build_prompt(&SummaryRequest::Site(pages), 5);
        assert!(prompt.contains("SOURCE: https://example.com/0"));
        assert!(!prompt.contains("SOURCE: https://example.com/9"));
        assert!(prompt.chars().count() < SITE_CONTENT_CHARS + 2_000);
    }

    #[tokio::test]
    async fn summarize_uses_generator() {
        let canned = Canned::ok(TWO_ENTRIES);
        let summarizer = SummaryGenerator::new(canned.clone()).with_max_entries(5);
        let entries = summarizer
            .summarize(&SummaryRequest::Site(vec![SourcePage {
                url: "https://example.com".into(),
                title: "Home".into(),
                text: "Welcome".into(),
            }]))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(canned.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generator_failure_is_generation_error() {
        let failing = Arc::new(Canned {
            reply: Err(FaqbotError::generation("HTTP 500")),
            prompts: Mutex::new(Vec::new()),
        });
        let err = SummaryGenerator::new(failing)
            .summarize(&SummaryRequest::Page {
                title: String::new(),
                description: String::new(),
                text: "text".into(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }
}
