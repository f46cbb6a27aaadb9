//! SQL migration definitions for the FAQBot database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Knowledge base: chatbots, qa_entries, crawled_pages",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS chatbots (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    welcome_message  TEXT NOT NULL,
    fallback_message TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'active',
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- Q&A entries are retired, never deleted
CREATE TABLE IF NOT EXISTS qa_entries (
    id            TEXT PRIMARY KEY,
    chatbot_id    TEXT NOT NULL REFERENCES chatbots(id),
    question      TEXT NOT NULL,
    answer        TEXT NOT NULL,
    keywords_json TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'active',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_qa_entries_chatbot ON qa_entries(chatbot_id, status);

-- Append-only crawl history; the same URL may appear many times
CREATE TABLE IF NOT EXISTS crawled_pages (
    id          TEXT PRIMARY KEY,
    chatbot_id  TEXT NOT NULL REFERENCES chatbots(id),
    url         TEXT NOT NULL,
    raw_text    TEXT NOT NULL,
    title       TEXT,
    description TEXT,
    crawled_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawled_pages_chatbot ON crawled_pages(chatbot_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Conversations: chat_sessions, chat_messages",
            sql: r#"
CREATE TABLE IF NOT EXISTS chat_sessions (
    id               TEXT PRIMARY KEY,
    chatbot_id       TEXT NOT NULL REFERENCES chatbots(id),
    started_at       TEXT NOT NULL,
    ended_at         TEXT,
    duration_seconds INTEGER,
    message_count    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_chat_sessions_chatbot ON chat_sessions(chatbot_id);

CREATE TABLE IF NOT EXISTS chat_messages (
    id               TEXT PRIMARY KEY,
    session_id       TEXT NOT NULL REFERENCES chat_sessions(id),
    sender           TEXT NOT NULL,
    message_text     TEXT NOT NULL,
    matched_entry_id TEXT REFERENCES qa_entries(id),
    sent_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
