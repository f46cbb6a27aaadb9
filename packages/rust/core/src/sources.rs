//! Ordered knowledge sources for loading a chatbot's entries.
//!
//! A [`SourceChain`] tries each [`KnowledgeSource`] in turn and returns the
//! first snapshot it gets. The usual order is the live store, then an exported
//! snapshot file, then built-in defaults that always succeed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use faqbot_shared::{
    Chatbot, ChatbotId, ChatbotProfile, FaqbotError, KnowledgeSnapshot, Lifecycle, QaEntry,
    Result, SNAPSHOT_SCHEMA_VERSION, StoredEntry,
};
use faqbot_storage::KnowledgeStore;

/// One place a chatbot's knowledge can be loaded from.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Short name reported when this source wins.
    fn name(&self) -> &'static str;

    /// When this source is expected to fail, for logs.
    fn failure_mode(&self) -> &'static str;

    async fn load(&self, chatbot_id: &ChatbotId) -> Result<KnowledgeSnapshot>;
}

/// Build a snapshot from a chatbot and its active entries.
pub fn build_snapshot(chatbot: &Chatbot, entries: Vec<StoredEntry>) -> KnowledgeSnapshot {
    KnowledgeSnapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        chatbot: ChatbotProfile::from(chatbot),
        entries,
        exported_at: Utc::now(),
    }
}

/// Write a snapshot as pretty-printed JSON.
pub fn write_snapshot(path: &Path, snapshot: &KnowledgeSnapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FaqbotError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| FaqbotError::parse(format!("failed to encode snapshot: {e}")))?;
    std::fs::write(path, json).map_err(|e| FaqbotError::io(path, e))
}

/// Read a snapshot written by [`write_snapshot`].
pub fn read_snapshot(path: &Path) -> Result<KnowledgeSnapshot> {
    let content = std::fs::read_to_string(path).map_err(|e| FaqbotError::io(path, e))?;
    let snapshot: KnowledgeSnapshot = serde_json::from_str(&content)
        .map_err(|e| FaqbotError::parse(format!("invalid snapshot {}: {e}", path.display())))?;
    if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(FaqbotError::parse(format!(
            "unsupported snapshot schema version {}",
            snapshot.schema_version
        )));
    }
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// The live store.
pub struct StoreSource {
    store: Arc<dyn KnowledgeStore>,
}

impl StoreSource {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl KnowledgeSource for StoreSource {
    fn name(&self) -> &'static str {
        "store"
    }

    fn failure_mode(&self) -> &'static str {
        "store error or unknown chatbot"
    }

    async fn load(&self, chatbot_id: &ChatbotId) -> Result<KnowledgeSnapshot> {
        let chatbot = self
            .store
            .get_chatbot(chatbot_id)
            .await?
            .ok_or_else(|| FaqbotError::invalid_input(format!("unknown chatbot {chatbot_id}")))?;
        let entries = self.store.list_active_entries(chatbot_id).await?;
        Ok(build_snapshot(&chatbot, entries))
    }
}

/// A previously exported snapshot file.
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl KnowledgeSource for SnapshotSource {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn failure_mode(&self) -> &'static str {
        "file missing, unreadable, or for another chatbot"
    }

    async fn load(&self, chatbot_id: &ChatbotId) -> Result<KnowledgeSnapshot> {
        let snapshot = read_snapshot(&self.path)?;
        if snapshot.chatbot.id != *chatbot_id {
            return Err(FaqbotError::invalid_input(format!(
                "snapshot {} belongs to chatbot {}",
                self.path.display(),
                snapshot.chatbot.id
            )));
        }
        Ok(snapshot)
    }
}

/// Built-in greeting, hours and contact entries. Never fails.
pub struct DefaultSource {
    fallback_message: String,
}

impl DefaultSource {
    pub fn new(fallback_message: impl Into<String>) -> Self {
        Self {
            fallback_message: fallback_message.into(),
        }
    }
}

#[async_trait]
impl KnowledgeSource for DefaultSource {
    fn name(&self) -> &'static str {
        "defaults"
    }

    fn failure_mode(&self) -> &'static str {
        "never fails"
    }

    async fn load(&self, chatbot_id: &ChatbotId) -> Result<KnowledgeSnapshot> {
        let now = Utc::now();
        let builtin = [
            (
                "default-hours",
                "What are your business hours?",
                "We are open Monday to Friday, 9 AM to 6 PM EST. Our customer service team is available during these hours to assist you.",
                &["hours", "open", "time", "schedule", "when", "available"][..],
            ),
            (
                "default-contact",
                "How can I contact support?",
                "You can reach us at support@example.com or call (555) 123-4567. We typically respond to emails within 24 hours.",
                &["contact", "support", "help", "email", "phone", "reach", "call"][..],
            ),
        ];

        let mut entries = Vec::with_capacity(builtin.len());
        for (id, question, answer, keywords) in builtin {
            entries.push(StoredEntry {
                id: id.to_string(),
                chatbot_id: chatbot_id.clone(),
                entry: QaEntry::new(question, answer, keywords)?,
                status: Lifecycle::Active,
                created_at: now,
                updated_at: now,
            });
        }

        Ok(KnowledgeSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            chatbot: ChatbotProfile {
                id: chatbot_id.clone(),
                name: "Customer Support Bot".into(),
                welcome_message: "Hi! How can I help you today?".into(),
                fallback_message: self.fallback_message.clone(),
            },
            entries,
            exported_at: now,
        })
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// A snapshot and the name of the source that produced it.
#[derive(Debug, Clone)]
pub struct LoadedKnowledge {
    pub snapshot: KnowledgeSnapshot,
    pub source: &'static str,
}

/// Sources tried in insertion order.
#[derive(Default)]
pub struct SourceChain {
    sources: Vec<Box<dyn KnowledgeSource>>,
}

impl SourceChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl KnowledgeSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Return the first successful load. If all sources fail, the last error
    /// is returned.
    pub async fn load(&self, chatbot_id: &ChatbotId) -> Result<LoadedKnowledge> {
        let mut last_err = None;
        for source in &self.sources {
            match source.load(chatbot_id).await {
                Ok(snapshot) => {
                    info!(
                        source = source.name(),
                        entries = snapshot.entries.len(),
                        "knowledge loaded"
                    );
                    return Ok(LoadedKnowledge {
                        snapshot,
                        source: source.name(),
                    });
                }
                Err(e) => {
                    warn!(
                        source = source.name(),
                        expected = source.failure_mode(),
                        error = %e,
                        "knowledge source failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| FaqbotError::config("no knowledge sources configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faqbot_storage::Storage;
    use uuid::Uuid;

    async fn store_with_bot() -> (Arc<Storage>, Chatbot) {
        let tmp = std::env::temp_dir().join(format!("faqbot-sources-test-{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();
        let bot = storage.create_chatbot("Acme", "Hello", "Sorry").await.unwrap();
        let entry = QaEntry::new("Do you ship?", "Yes.", ["shipping"]).unwrap();
        storage.create_entry(&bot.id, &entry).await.unwrap();
        (Arc::new(storage), bot)
    }

    fn temp_snapshot_path() -> PathBuf {
        std::env::temp_dir().join(format!("faqbot-snapshot-{}.json", Uuid::now_v7()))
    }

    #[tokio::test]
    async fn store_wins_when_available() {
        let (store, bot) = store_with_bot().await;
        let chain = SourceChain::new()
            .with(StoreSource::new(store))
            .with(DefaultSource::new("Sorry"));

        let loaded = chain.load(&bot.id).await.unwrap();
        assert_eq!(loaded.source, "store");
        assert_eq!(loaded.snapshot.chatbot.name, "Acme");
        assert_eq!(loaded.snapshot.entries.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_used_when_store_misses() {
        let (store, bot) = store_with_bot().await;
        let path = temp_snapshot_path();
        let exported = StoreSource::new(store.clone()).load(&bot.id).await.unwrap();
        write_snapshot(&path, &exported).unwrap();

        // Unknown to this fresh store, known to the snapshot.
        let (other_store, _) = store_with_bot().await;
        let chain = SourceChain::new()
            .with(StoreSource::new(other_store))
            .with(SnapshotSource::new(&path))
            .with(DefaultSource::new("Sorry"));

        let loaded = chain.load(&bot.id).await.unwrap();
        assert_eq!(loaded.source, "snapshot");
        assert_eq!(loaded.snapshot.entries[0].entry.question, "Do you ship?");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn snapshot_for_other_chatbot_is_skipped() {
        let (store, bot) = store_with_bot().await;
        let path = temp_snapshot_path();
        write_snapshot(&path, &StoreSource::new(store).load(&bot.id).await.unwrap()).unwrap();

        let chain = SourceChain::new()
            .with(SnapshotSource::new(&path))
            .with(DefaultSource::new("Call us."));
        let loaded = chain.load(&ChatbotId::new()).await.unwrap();
        assert_eq!(loaded.source, "defaults");
        assert_eq!(loaded.snapshot.entries.len(), 2);
        assert_eq!(loaded.snapshot.chatbot.fallback_message, "Call us.");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn all_failures_return_last_error() {
        let chain = SourceChain::new().with(SnapshotSource::new("/nonexistent/faqbot.json"));
        let err = chain.load(&ChatbotId::new()).await.unwrap_err();
        assert!(matches!(err, FaqbotError::Io { .. }));

        assert!(SourceChain::new().load(&ChatbotId::new()).await.is_err());
    }

    #[tokio::test]
    async fn defaults_match_common_questions() {
        let snapshot = DefaultSource::new("Sorry").load(&ChatbotId::new()).await.unwrap();
        let hit = faqbot_matcher::best_match("how do I reach you by phone", &snapshot.entries)
            .expect("contact entry matches");
        assert_eq!(hit.entry.id, "default-contact");
    }
}
