//! Knowledge-base storage: the [`KnowledgeStore`] contract and its libSQL
//! implementation, [`Storage`].
//!
//! Every operation touches a single record. Soft-deleted (retired) entries
//! stay in the database; the "active only" filter is applied here, in the
//! read contract, and nowhere else.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use faqbot_shared::{
    ChatMessage, ChatSession, Chatbot, ChatbotId, ConversationStats, CrawledPage, FaqbotError,
    Lifecycle, NewCrawledPage, QaEntry, RecentQuery, Result, Sender, StoredEntry, TopQuestion,
};
use libsql::{Connection, Database, params};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Record store consumed by the crawl orchestrator and conversation runtime.
///
/// Errors propagate as-is; each call site decides whether to retry, swallow,
/// or surface them.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Look up a chatbot regardless of its lifecycle state.
    async fn get_chatbot(&self, id: &ChatbotId) -> Result<Option<Chatbot>>;

    /// Active entries for a chatbot, oldest first.
    async fn list_active_entries(&self, chatbot_id: &ChatbotId) -> Result<Vec<StoredEntry>>;

    async fn create_entry(&self, chatbot_id: &ChatbotId, entry: &QaEntry) -> Result<StoredEntry>;

    /// Replace the content of an active entry.
    async fn update_entry(&self, id: &str, entry: &QaEntry) -> Result<StoredEntry>;

    /// Retire an entry. It disappears from [`Self::list_active_entries`] but
    /// is never physically removed.
    async fn soft_delete_entry(&self, id: &str) -> Result<()>;

    /// Append a crawled page. Re-crawling a URL adds a new record.
    async fn save_crawled_page(
        &self,
        chatbot_id: &ChatbotId,
        page: &NewCrawledPage,
    ) -> Result<CrawledPage>;

    /// All crawled pages for a chatbot, oldest first.
    async fn list_crawled_pages(&self, chatbot_id: &ChatbotId) -> Result<Vec<CrawledPage>>;

    async fn create_session(&self, chatbot_id: &ChatbotId) -> Result<ChatSession>;

    /// Append a message and bump the session's message count.
    async fn record_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
        matched_entry_id: Option<&str>,
    ) -> Result<ChatMessage>;

    /// Close a session. Ending an already-ended session is a no-op.
    async fn end_session(&self, session_id: &str) -> Result<ChatSession>;
}

// ---------------------------------------------------------------------------
// libSQL storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

const ENTRY_COLUMNS: &str =
    "id, chatbot_id, question, answer, keywords_json, status, created_at, updated_at";
const PAGE_COLUMNS: &str = "id, chatbot_id, url, raw_text, title, description, crawled_at";
const SESSION_COLUMNS: &str =
    "id, chatbot_id, started_at, ended_at, duration_seconds, message_count";
const CHATBOT_COLUMNS: &str =
    "id, name, welcome_message, fallback_message, status, created_at, updated_at";

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FaqbotError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    FaqbotError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Chatbot operations
    // -----------------------------------------------------------------------

    /// Insert a new chatbot.
    pub async fn create_chatbot(
        &self,
        name: &str,
        welcome_message: &str,
        fallback_message: &str,
    ) -> Result<Chatbot> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FaqbotError::invalid_input("chatbot name must not be empty"));
        }

        let now = Utc::now();
        let bot = Chatbot {
            id: ChatbotId::new(),
            name: name.to_string(),
            welcome_message: welcome_message.to_string(),
            fallback_message: fallback_message.to_string(),
            status: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };

        self.conn
            .execute(
                "INSERT INTO chatbots (id, name, welcome_message, fallback_message, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bot.id.to_string(),
                    bot.name.as_str(),
                    bot.welcome_message.as_str(),
                    bot.fallback_message.as_str(),
                    bot.status.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(bot)
    }

    /// List active chatbots by name.
    pub async fn list_chatbots(&self) -> Result<Vec<Chatbot>> {
        let sql = format!(
            "SELECT {CHATBOT_COLUMNS} FROM chatbots WHERE status = 'active' ORDER BY name"
        );
        let mut rows = self.conn.query(&sql, params![]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_chatbot(&row)?);
        }
        Ok(results)
    }

    /// Retire a chatbot. Its entries and pages are kept.
    pub async fn retire_chatbot(&self, id: &ChatbotId) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE chatbots SET status = 'retired', updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(db_err)?;
        if changed == 0 {
            return Err(FaqbotError::invalid_input(format!("chatbot {id} not found")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Entry operations
    // -----------------------------------------------------------------------

    /// Get an entry by ID in any lifecycle state.
    pub async fn get_entry(&self, id: &str) -> Result<Option<StoredEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM qa_entries WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Session operations
    // -----------------------------------------------------------------------

    pub async fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    /// Messages of a session in the order they were sent.
    pub async fn list_session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, session_id, sender, message_text, matched_entry_id, sent_at
                 FROM chat_messages WHERE session_id = ?1 ORDER BY sent_at, rowid",
                params![session_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(ChatMessage {
                id: row.get::<String>(0).map_err(db_err)?,
                session_id: row.get::<String>(1).map_err(db_err)?,
                sender: row.get::<String>(2).map_err(db_err)?.parse()?,
                text: row.get::<String>(3).map_err(db_err)?,
                matched_entry_id: row.get::<String>(4).ok(),
                sent_at: parse_timestamp(&row.get::<String>(5).map_err(db_err)?)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Analytics
    // -----------------------------------------------------------------------

    /// Session totals and outcomes for a chatbot.
    pub async fn conversation_stats(&self, chatbot_id: &ChatbotId) -> Result<ConversationStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*),
                        COALESCE(SUM(message_count), 0),
                        COALESCE(CAST(ROUND(AVG(CASE WHEN duration_seconds > 0 THEN duration_seconds END)) AS INTEGER), 0),
                        COALESCE(SUM(CASE WHEN ended_at IS NULL THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN message_count > 2 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN ended_at IS NOT NULL AND message_count > 3 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN ended_at IS NOT NULL AND message_count <= 2 THEN 1 ELSE 0 END), 0)
                 FROM chat_sessions WHERE chatbot_id = ?1",
                params![chatbot_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(ConversationStats::default());
        };
        Ok(ConversationStats {
            total_conversations: get_count(&row, 0)?,
            total_messages: get_count(&row, 1)?,
            avg_duration_seconds: get_count(&row, 2)?,
            active_conversations: get_count(&row, 3)?,
            engaged_conversations: get_count(&row, 4)?,
            resolved: get_count(&row, 5)?,
            unresolved: get_count(&row, 6)?,
        })
    }

    /// Entries that answered the most bot replies, most hits first. Ties
    /// keep the entry first matched.
    pub async fn top_questions(&self, chatbot_id: &ChatbotId, limit: u32) -> Result<Vec<TopQuestion>> {
        let mut rows = self
            .conn
            .query(
                "SELECT m.matched_entry_id, q.question, COUNT(*) AS hits
                 FROM chat_messages m
                 JOIN chat_sessions s ON s.id = m.session_id
                 JOIN qa_entries q ON q.id = m.matched_entry_id
                 WHERE s.chatbot_id = ?1 AND m.sender = 'bot' AND m.matched_entry_id IS NOT NULL
                 GROUP BY m.matched_entry_id, q.question
                 ORDER BY hits DESC, MIN(m.rowid)
                 LIMIT ?2",
                params![chatbot_id.to_string(), i64::from(limit)],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(TopQuestion {
                entry_id: row.get::<String>(0).map_err(db_err)?,
                question: row.get::<String>(1).map_err(db_err)?,
                hits: get_count(&row, 2)?,
            });
        }
        Ok(results)
    }

    /// Latest user messages across all of a chatbot's sessions.
    pub async fn recent_queries(&self, chatbot_id: &ChatbotId, limit: u32) -> Result<Vec<RecentQuery>> {
        let mut rows = self
            .conn
            .query(
                "SELECT m.message_text, m.session_id, m.sent_at
                 FROM chat_messages m
                 JOIN chat_sessions s ON s.id = m.session_id
                 WHERE s.chatbot_id = ?1 AND m.sender = 'user'
                 ORDER BY m.sent_at DESC, m.rowid DESC
                 LIMIT ?2",
                params![chatbot_id.to_string(), i64::from(limit)],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(RecentQuery {
                text: row.get::<String>(0).map_err(db_err)?,
                session_id: row.get::<String>(1).map_err(db_err)?,
                sent_at: parse_timestamp(&row.get::<String>(2).map_err(db_err)?)?,
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl KnowledgeStore for Storage {
    async fn get_chatbot(&self, id: &ChatbotId) -> Result<Option<Chatbot>> {
        let sql = format!("SELECT {CHATBOT_COLUMNS} FROM chatbots WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_chatbot(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_active_entries(&self, chatbot_id: &ChatbotId) -> Result<Vec<StoredEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM qa_entries
             WHERE chatbot_id = ?1 AND status = 'active'
             ORDER BY created_at, rowid"
        );
        let mut rows = self
            .conn
            .query(&sql, params![chatbot_id.to_string()])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_entry(&row)?);
        }
        Ok(results)
    }

    async fn create_entry(&self, chatbot_id: &ChatbotId, entry: &QaEntry) -> Result<StoredEntry> {
        let now = Utc::now();
        let stored = StoredEntry {
            id: Uuid::now_v7().to_string(),
            chatbot_id: chatbot_id.clone(),
            entry: entry.clone(),
            status: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };
        let keywords_json = serde_json::to_string(&entry.keywords)
            .map_err(|e| FaqbotError::Storage(format!("failed to encode keywords: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO qa_entries (id, chatbot_id, question, answer, keywords_json, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    stored.id.as_str(),
                    chatbot_id.to_string(),
                    entry.question.as_str(),
                    entry.answer.as_str(),
                    keywords_json,
                    stored.status.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(stored)
    }

    async fn update_entry(&self, id: &str, entry: &QaEntry) -> Result<StoredEntry> {
        let keywords_json = serde_json::to_string(&entry.keywords)
            .map_err(|e| FaqbotError::Storage(format!("failed to encode keywords: {e}")))?;

        let changed = self
            .conn
            .execute(
                "UPDATE qa_entries
                 SET question = ?1, answer = ?2, keywords_json = ?3, updated_at = ?4
                 WHERE id = ?5 AND status = 'active'",
                params![
                    entry.question.as_str(),
                    entry.answer.as_str(),
                    keywords_json,
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(FaqbotError::invalid_input(format!(
                "no active entry with id {id}"
            )));
        }

        self.get_entry(id)
            .await?
            .ok_or_else(|| FaqbotError::Storage(format!("entry {id} vanished after update")))
    }

    async fn soft_delete_entry(&self, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE qa_entries SET status = 'retired', updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(FaqbotError::invalid_input(format!("no entry with id {id}")));
        }
        tracing::debug!(entry_id = id, "entry retired");
        Ok(())
    }

    async fn save_crawled_page(
        &self,
        chatbot_id: &ChatbotId,
        page: &NewCrawledPage,
    ) -> Result<CrawledPage> {
        let saved = CrawledPage {
            id: Uuid::now_v7().to_string(),
            chatbot_id: chatbot_id.clone(),
            url: page.url.clone(),
            raw_text: page.raw_text.clone(),
            title: page.title.clone(),
            description: page.description.clone(),
            crawled_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO crawled_pages (id, chatbot_id, url, raw_text, title, description, crawled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    saved.id.as_str(),
                    chatbot_id.to_string(),
                    saved.url.as_str(),
                    saved.raw_text.as_str(),
                    saved.title.as_deref(),
                    saved.description.as_deref(),
                    saved.crawled_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(saved)
    }

    async fn list_crawled_pages(&self, chatbot_id: &ChatbotId) -> Result<Vec<CrawledPage>> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM crawled_pages WHERE chatbot_id = ?1 ORDER BY crawled_at, rowid"
        );
        let mut rows = self
            .conn
            .query(&sql, params![chatbot_id.to_string()])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_page(&row)?);
        }
        Ok(results)
    }

    async fn create_session(&self, chatbot_id: &ChatbotId) -> Result<ChatSession> {
        let session = ChatSession {
            id: Uuid::now_v7().to_string(),
            chatbot_id: chatbot_id.clone(),
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            message_count: 0,
        };

        self.conn
            .execute(
                "INSERT INTO chat_sessions (id, chatbot_id, started_at, message_count)
                 VALUES (?1, ?2, ?3, 0)",
                params![
                    session.id.as_str(),
                    chatbot_id.to_string(),
                    session.started_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(session)
    }

    async fn record_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
        matched_entry_id: Option<&str>,
    ) -> Result<ChatMessage> {
        let message = ChatMessage {
            id: Uuid::now_v7().to_string(),
            session_id: session_id.to_string(),
            sender,
            text: text.to_string(),
            matched_entry_id: matched_entry_id.map(str::to_string),
            sent_at: Utc::now(),
        };

        // Insert and count bump commit together; dropping `tx` rolls back.
        let tx = self.conn.transaction().await.map_err(db_err)?;
        tx.execute(
            "INSERT INTO chat_messages (id, session_id, sender, message_text, matched_entry_id, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.as_str(),
                session_id,
                sender.as_str(),
                text,
                matched_entry_id,
                message.sent_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(db_err)?;

        let changed = tx
            .execute(
                "UPDATE chat_sessions SET message_count = message_count + 1 WHERE id = ?1",
                params![session_id],
            )
            .await
            .map_err(db_err)?;
        if changed == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Err(FaqbotError::invalid_input(format!(
                "no session with id {session_id}"
            )));
        }
        tx.commit().await.map_err(db_err)?;

        Ok(message)
    }

    async fn end_session(&self, session_id: &str) -> Result<ChatSession> {
        let session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| FaqbotError::invalid_input(format!("no session with id {session_id}")))?;

        if session.ended_at.is_some() {
            return Ok(session);
        }

        let ended_at = Utc::now();
        let duration = (ended_at - session.started_at).num_seconds().max(0);
        self.conn
            .execute(
                "UPDATE chat_sessions SET ended_at = ?1, duration_seconds = ?2 WHERE id = ?3",
                params![ended_at.to_rfc3339(), duration, session_id],
            )
            .await
            .map_err(db_err)?;

        Ok(ChatSession {
            ended_at: Some(ended_at),
            duration_seconds: Some(duration),
            ..session
        })
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> FaqbotError {
    FaqbotError::Storage(e.to_string())
}

fn get_count(row: &libsql::Row, idx: i32) -> Result<u64> {
    let value = row.get::<i64>(idx).map_err(db_err)?;
    u64::try_from(value).map_err(|_| FaqbotError::Storage(format!("negative count {value}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FaqbotError::Storage(format!("invalid date: {e}")))
}

fn parse_chatbot_id(s: &str) -> Result<ChatbotId> {
    s.parse()
        .map_err(|e| FaqbotError::Storage(format!("invalid chatbot id {s:?}: {e}")))
}

fn row_to_chatbot(row: &libsql::Row) -> Result<Chatbot> {
    Ok(Chatbot {
        id: parse_chatbot_id(&row.get::<String>(0).map_err(db_err)?)?,
        name: row.get::<String>(1).map_err(db_err)?,
        welcome_message: row.get::<String>(2).map_err(db_err)?,
        fallback_message: row.get::<String>(3).map_err(db_err)?,
        status: row.get::<String>(4).map_err(db_err)?.parse()?,
        created_at: parse_timestamp(&row.get::<String>(5).map_err(db_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(6).map_err(db_err)?)?,
    })
}

fn row_to_entry(row: &libsql::Row) -> Result<StoredEntry> {
    let keywords_json = row.get::<String>(4).map_err(db_err)?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_json)
        .map_err(|e| FaqbotError::Storage(format!("corrupt keywords column: {e}")))?;

    Ok(StoredEntry {
        id: row.get::<String>(0).map_err(db_err)?,
        chatbot_id: parse_chatbot_id(&row.get::<String>(1).map_err(db_err)?)?,
        entry: QaEntry {
            question: row.get::<String>(2).map_err(db_err)?,
            answer: row.get::<String>(3).map_err(db_err)?,
            keywords,
        },
        status: row.get::<String>(5).map_err(db_err)?.parse()?,
        created_at: parse_timestamp(&row.get::<String>(6).map_err(db_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(7).map_err(db_err)?)?,
    })
}

fn row_to_page(row: &libsql::Row) -> Result<CrawledPage> {
    Ok(CrawledPage {
        id: row.get::<String>(0).map_err(db_err)?,
        chatbot_id: parse_chatbot_id(&row.get::<String>(1).map_err(db_err)?)?,
        url: row.get::<String>(2).map_err(db_err)?,
        raw_text: row.get::<String>(3).map_err(db_err)?,
        title: row.get::<String>(4).ok(),
        description: row.get::<String>(5).ok(),
        crawled_at: parse_timestamp(&row.get::<String>(6).map_err(db_err)?)?,
    })
}

fn row_to_session(row: &libsql::Row) -> Result<ChatSession> {
    Ok(ChatSession {
        id: row.get::<String>(0).map_err(db_err)?,
        chatbot_id: parse_chatbot_id(&row.get::<String>(1).map_err(db_err)?)?,
        started_at: parse_timestamp(&row.get::<String>(2).map_err(db_err)?)?,
        ended_at: match row.get::<String>(3).ok() {
            Some(s) => Some(parse_timestamp(&s)?),
            None => None,
        },
        duration_seconds: row.get::<i64>(4).ok(),
        message_count: row.get::<u32>(5).map_err(db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("faqbot_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    async fn test_bot(storage: &Storage) -> Chatbot {
        storage
            .create_chatbot("Acme Support", "Hi!", "Sorry, no idea.")
            .await
            .expect("create chatbot")
    }

    fn hours() -> QaEntry {
        QaEntry::new("What are your hours?", "9-6 Mon-Fri", ["hours", "open"]).unwrap()
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let tmp = std::env::temp_dir().join(format!("faqbot_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&tmp).await.unwrap();
        test_bot(&first).await;
        drop(first);

        let second = Storage::open(&tmp).await.expect("reopen");
        assert_eq!(second.list_chatbots().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chatbot_crud() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;

        let fetched = storage.get_chatbot(&bot.id).await.unwrap().expect("exists");
        assert_eq!(fetched.name, "Acme Support");
        assert_eq!(fetched.fallback_message, "Sorry, no idea.");

        assert!(storage.create_chatbot("  ", "", "").await.is_err());

        storage.retire_chatbot(&bot.id).await.unwrap();
        assert!(storage.list_chatbots().await.unwrap().is_empty());
        let retired = storage.get_chatbot(&bot.id).await.unwrap().expect("still stored");
        assert_eq!(retired.status, Lifecycle::Retired);
    }

    #[tokio::test]
    async fn entry_lifecycle() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;

        let created = storage.create_entry(&bot.id, &hours()).await.unwrap();
        let listed = storage.list_active_entries(&bot.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].entry.keywords, vec!["hours", "open"]);

        let edited = QaEntry::new("When are you open?", "8-5 daily", ["open"]).unwrap();
        let updated = storage.update_entry(&created.id, &edited).await.unwrap();
        assert_eq!(updated.entry.answer, "8-5 daily");
        assert!(updated.updated_at >= created.updated_at);

        storage.soft_delete_entry(&created.id).await.unwrap();
        assert!(storage.list_active_entries(&bot.id).await.unwrap().is_empty());

        // Retired, not removed.
        let retired = storage.get_entry(&created.id).await.unwrap().expect("kept");
        assert_eq!(retired.status, Lifecycle::Retired);

        // Retired entries cannot be edited.
        assert!(storage.update_entry(&created.id, &edited).await.is_err());
        assert!(storage.soft_delete_entry("missing").await.is_err());
    }

    #[tokio::test]
    async fn entries_are_scoped_and_ordered() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;
        let other = storage.create_chatbot("Other", "Hi", "Sorry").await.unwrap();

        for q in ["First?", "Second?", "Third?"] {
            let e = QaEntry::new(q, "a", ["k"]).unwrap();
            storage.create_entry(&bot.id, &e).await.unwrap();
        }
        storage.create_entry(&other.id, &hours()).await.unwrap();

        let listed = storage.list_active_entries(&bot.id).await.unwrap();
        let questions: Vec<&str> = listed.iter().map(|e| e.entry.question.as_str()).collect();
        assert_eq!(questions, vec!["First?", "Second?", "Third?"]);
    }

    #[tokio::test]
    async fn crawled_pages_are_append_only() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;

        let page = NewCrawledPage {
            url: "https://example.com/about".into(),
            raw_text: "About us".into(),
            title: Some("About".into()),
            description: None,
        };
        let first = storage.save_crawled_page(&bot.id, &page).await.unwrap();
        let second = storage.save_crawled_page(&bot.id, &page).await.unwrap();
        assert_ne!(first.id, second.id);

        let pages = storage.list_crawled_pages(&bot.id).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|p| p.url == "https://example.com/about"));
        assert_eq!(pages[0].title.as_deref(), Some("About"));
        assert!(pages[0].description.is_none());
    }

    #[tokio::test]
    async fn session_counts_messages() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;
        let entry = storage.create_entry(&bot.id, &hours()).await.unwrap();

        let session = storage.create_session(&bot.id).await.unwrap();
        assert_eq!(session.message_count, 0);

        storage
            .record_message(&session.id, Sender::User, "when are you open", None)
            .await
            .unwrap();
        storage
            .record_message(&session.id, Sender::Bot, "9-6 Mon-Fri", Some(&entry.id))
            .await
            .unwrap();

        let reloaded = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(reloaded.message_count, 2);

        let messages = storage.list_session_messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].matched_entry_id.as_deref(), Some(entry.id.as_str()));

        let ended = storage.end_session(&session.id).await.unwrap();
        assert!(ended.ended_at.is_some());
        assert!(ended.duration_seconds.unwrap() >= 0);

        let again = storage.end_session(&session.id).await.unwrap();
        assert_eq!(again.ended_at, ended.ended_at);

        assert!(
            storage
                .record_message("missing", Sender::User, "hi", None)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn failed_message_insert_leaves_count_unchanged() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;
        let session = storage.create_session(&bot.id).await.unwrap();
        storage
            .record_message(&session.id, Sender::User, "hello", None)
            .await
            .unwrap();

        storage
            .conn
            .execute("DROP TABLE chat_messages", ())
            .await
            .unwrap();
        assert!(
            storage
                .record_message(&session.id, Sender::Bot, "hi there", None)
                .await
                .is_err()
        );

        let reloaded = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(reloaded.message_count, 1);
    }

    #[tokio::test]
    async fn message_for_missing_session_is_not_kept() {
        let storage = test_storage().await;
        assert!(
            storage
                .record_message("missing", Sender::User, "hi", None)
                .await
                .is_err()
        );
        assert!(storage.list_session_messages("missing").await.unwrap().is_empty());
    }

    /// One session answering each question in turn. Every bot reply is
    /// attributed to `matched`.
    async fn converse(
        storage: &Storage,
        bot: &Chatbot,
        questions: &[&str],
        matched: Option<&str>,
        end: bool,
    ) -> ChatSession {
        let session = storage.create_session(&bot.id).await.unwrap();
        for q in questions {
            storage
                .record_message(&session.id, Sender::User, q, None)
                .await
                .unwrap();
            storage
                .record_message(&session.id, Sender::Bot, "answer", matched)
                .await
                .unwrap();
        }
        if end {
            storage.end_session(&session.id).await.unwrap()
        } else {
            session
        }
    }

    #[tokio::test]
    async fn stats_summarize_sessions() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;
        let other = storage.create_chatbot("Other", "Hi", "Sorry").await.unwrap();

        // 4 messages, ended: resolved and engaged.
        let long = converse(&storage, &bot, &["hours?", "address?"], None, true).await;
        // 2 messages, ended: unresolved.
        converse(&storage, &bot, &["hi"], None, true).await;
        // 2 messages, still open.
        converse(&storage, &bot, &["refund?"], None, false).await;
        // Not counted.
        converse(&storage, &other, &["x", "y", "z"], None, true).await;

        storage
            .conn
            .execute(
                "UPDATE chat_sessions SET duration_seconds = 90 WHERE id = ?1",
                params![long.id.as_str()],
            )
            .await
            .unwrap();

        let stats = storage.conversation_stats(&bot.id).await.unwrap();
        assert_eq!(
            stats,
            ConversationStats {
                total_conversations: 3,
                total_messages: 8,
                avg_duration_seconds: 90,
                active_conversations: 1,
                engaged_conversations: 1,
                resolved: 1,
                unresolved: 1,
            }
        );
        assert_eq!(stats.response_rate_percent(), 33);

        let empty = storage.create_chatbot("Quiet", "Hi", "Sorry").await.unwrap();
        let none = storage.conversation_stats(&empty.id).await.unwrap();
        assert_eq!(none, ConversationStats::default());
        assert_eq!(none.response_rate_percent(), 0);
    }

    #[tokio::test]
    async fn top_questions_count_matched_replies() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;
        let hours_entry = storage.create_entry(&bot.id, &hours()).await.unwrap();
        let refund = storage
            .create_entry(&bot.id, &QaEntry::new("Refunds?", "30 days", ["refund"]).unwrap())
            .await
            .unwrap();

        converse(&storage, &bot, &["refund?"], Some(&refund.id), true).await;
        converse(&storage, &bot, &["open?", "hours?"], Some(&hours_entry.id), true).await;
        converse(&storage, &bot, &["shoes?"], None, true).await;

        let top = storage.top_questions(&bot.id, 10).await.unwrap();
        assert_eq!(
            top,
            vec![
                TopQuestion {
                    entry_id: hours_entry.id.clone(),
                    question: "What are your hours?".into(),
                    hits: 2,
                },
                TopQuestion {
                    entry_id: refund.id.clone(),
                    question: "Refunds?".into(),
                    hits: 1,
                },
            ]
        );
        assert_eq!(storage.top_questions(&bot.id, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_queries_are_user_messages_newest_first() {
        let storage = test_storage().await;
        let bot = test_bot(&storage).await;
        converse(&storage, &bot, &["first", "second"], None, true).await;
        converse(&storage, &bot, &["third"], None, false).await;

        let recent = storage.recent_queries(&bot.id, 20).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second", "first"]);

        let limited = storage.recent_queries(&bot.id, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].text, "third");
    }
}
