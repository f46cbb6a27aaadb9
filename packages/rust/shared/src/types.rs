//! Core domain types for FAQBot knowledge bases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FaqbotError, Result};

/// Current schema version for the exported knowledge snapshot format.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Longest keyword kept on a Q&A entry, in characters.
pub const MAX_KEYWORD_LEN: usize = 50;

// ---------------------------------------------------------------------------
// ChatbotId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for chatbot identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatbotId(pub Uuid);

impl ChatbotId {
    /// Generate a new time-sortable chatbot identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ChatbotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChatbotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChatbotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of a soft-deletable record. Records are never physically removed;
/// deleting one moves it to `Retired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Retired,
}

impl Lifecycle {
    /// Column value used by the storage layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retired => "retired",
        }
    }
}

impl std::str::FromStr for Lifecycle {
    type Err = FaqbotError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "retired" => Ok(Self::Retired),
            other => Err(FaqbotError::parse(format!("unknown lifecycle state: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// QaEntry
// ---------------------------------------------------------------------------

/// A question/answer pair with the keywords used for lexical matching.
///
/// This is also the exact wire shape of crawl candidates and of the JSON the
/// text-generation service is asked to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    pub keywords: Vec<String>,
}

impl QaEntry {
    /// Build an entry, trimming text and normalizing keywords.
    ///
    /// Fails when the question or answer is blank, or no keyword survives
    /// normalization.
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        keywords: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let question = question.into().trim().to_string();
        let answer = answer.into().trim().to_string();

        if question.is_empty() {
            return Err(FaqbotError::invalid_input("question must not be empty"));
        }
        if answer.is_empty() {
            return Err(FaqbotError::invalid_input("answer must not be empty"));
        }

        let keywords = normalize_keywords(keywords);
        if keywords.is_empty() {
            return Err(FaqbotError::invalid_input(
                "an entry needs at least one keyword",
            ));
        }

        Ok(Self {
            question,
            answer,
            keywords,
        })
    }
}

impl AsRef<QaEntry> for QaEntry {
    fn as_ref(&self) -> &QaEntry {
        self
    }
}

/// Lower-case and trim a single keyword, capping it at [`MAX_KEYWORD_LEN`]
/// characters. Returns `None` for blank input.
pub fn normalize_keyword(raw: &str) -> Option<String> {
    let kw: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .take(MAX_KEYWORD_LEN)
        .collect();
    let kw = kw.trim_end().to_string();
    (!kw.is_empty()).then_some(kw)
}

/// Normalize a keyword list: lower-case, trim, drop blanks and duplicates,
/// keep first-seen order.
pub fn normalize_keywords(raw: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for kw in raw {
        if let Some(kw) = normalize_keyword(kw.as_ref()) {
            if !out.contains(&kw) {
                out.push(kw);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// StoredEntry
// ---------------------------------------------------------------------------

/// A Q&A entry as persisted for one chatbot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Unique entry identifier (UUID v7).
    pub id: String,
    /// Owning chatbot.
    pub chatbot_id: ChatbotId,
    #[serde(flatten)]
    pub entry: QaEntry,
    pub status: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AsRef<QaEntry> for StoredEntry {
    fn as_ref(&self) -> &QaEntry {
        &self.entry
    }
}

// ---------------------------------------------------------------------------
// Crawled pages
// ---------------------------------------------------------------------------

/// Extracted content of one successfully crawled page. Append-only: crawling
/// the same URL again produces a second record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub id: String,
    pub chatbot_id: ChatbotId,
    pub url: String,
    /// Normalized main text, at most 6000 characters.
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub crawled_at: DateTime<Utc>,
}

/// Fields supplied when saving a freshly extracted page.
#[derive(Debug, Clone)]
pub struct NewCrawledPage {
    pub url: String,
    pub raw_text: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Chatbots and conversations
// ---------------------------------------------------------------------------

/// A chatbot owning a set of Q&A entries and crawled pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chatbot {
    pub id: ChatbotId,
    pub name: String,
    pub welcome_message: String,
    /// Reply used when neither the matcher nor generation can answer.
    pub fallback_message: String,
    pub status: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One chat conversation with a chatbot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub chatbot_id: ChatbotId,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    /// Incremented by one for every recorded message.
    pub message_count: u32,
}

/// Who sent a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

impl std::str::FromStr for Sender {
    type Err = FaqbotError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "bot" => Ok(Self::Bot),
            other => Err(FaqbotError::parse(format!("unknown sender: {other}"))),
        }
    }
}

/// A single message within a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub sender: Sender,
    pub text: String,
    /// The entry the matcher answered with, for analytics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_entry_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

/// Conversation totals for one chatbot.
///
/// A session is engaged when it has more than two messages. Among ended
/// sessions, more than three messages counts as resolved and two or fewer as
/// unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationStats {
    pub total_conversations: u64,
    pub total_messages: u64,
    /// Rounded mean over sessions with a non-zero duration; 0 when none.
    pub avg_duration_seconds: u64,
    /// Sessions not yet ended.
    pub active_conversations: u64,
    pub engaged_conversations: u64,
    pub resolved: u64,
    pub unresolved: u64,
}

impl ConversationStats {
    /// Engaged sessions as a rounded percentage of all sessions.
    pub fn response_rate_percent(&self) -> u64 {
        if self.total_conversations == 0 {
            return 0;
        }
        (self.engaged_conversations * 100 + self.total_conversations / 2) / self.total_conversations
    }
}

/// An entry and how many bot replies it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopQuestion {
    pub entry_id: String,
    pub question: String,
    pub hits: u64,
}

/// A user message, newest first in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentQuery {
    pub text: String,
    pub session_id: String,
    pub sent_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// KnowledgeSnapshot
// ---------------------------------------------------------------------------

/// Public profile of a chatbot as embedded in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotProfile {
    pub id: ChatbotId,
    pub name: String,
    pub welcome_message: String,
    pub fallback_message: String,
}

impl From<&Chatbot> for ChatbotProfile {
    fn from(bot: &Chatbot) -> Self {
        Self {
            id: bot.id.clone(),
            name: bot.name.clone(),
            welcome_message: bot.welcome_message.clone(),
            fallback_message: bot.fallback_message.clone(),
        }
    }
}

/// Exported, self-contained view of a chatbot's active entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    pub schema_version: u32,
    pub chatbot: ChatbotProfile,
    pub entries: Vec<StoredEntry>,
    pub exported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chatbot_id_roundtrip() {
        let id = ChatbotId::new();
        let s = id.to_string();
        let parsed: ChatbotId = s.parse().expect("parse ChatbotId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn entry_normalizes_fields() {
        let entry = QaEntry::new(
            "  What are your hours? ",
            " 9-6 Mon-Fri ",
            ["  Hours", "OPEN", "hours", ""],
        )
        .expect("valid entry");
        assert_eq!(entry.question, "What are your hours?");
        assert_eq!(entry.answer, "9-6 Mon-Fri");
        assert_eq!(entry.keywords, vec!["hours", "open"]);
    }

    #[test]
    fn entry_rejects_blank_parts() {
        assert!(QaEntry::new("  ", "answer", ["kw"]).is_err());
        assert!(QaEntry::new("question", "", ["kw"]).is_err());
        let err = QaEntry::new("question", "answer", ["  "]).unwrap_err();
        assert!(err.to_string().contains("at least one keyword"));
    }

    #[test]
    fn keyword_is_capped() {
        let long = "k".repeat(80);
        let kw = normalize_keyword(&long).expect("non-empty");
        assert_eq!(kw.chars().count(), MAX_KEYWORD_LEN);
    }

    #[test]
    fn lifecycle_parses() {
        assert_eq!("retired".parse::<Lifecycle>().unwrap(), Lifecycle::Retired);
        assert!("deleted".parse::<Lifecycle>().is_err());
    }

    #[test]
    fn stored_entry_serializes_flat() {
        let stored = StoredEntry {
            id: "e1".into(),
            chatbot_id: ChatbotId::new(),
            entry: QaEntry::new("Q?", "A.", ["q"]).unwrap(),
            status: Lifecycle::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&stored).expect("serialize");
        assert_eq!(value["question"], "Q?");
        assert_eq!(value["status"], "active");

        let parsed: StoredEntry = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed.entry.keywords, vec!["q"]);
    }
}
