//! Shared types, error model, and configuration for FAQBot.
//!
//! This crate is the foundation depended on by all other FAQBot crates.
//! It provides:
//! - [`FaqbotError`]: the unified error type
//! - Domain types ([`QaEntry`], [`StoredEntry`], [`CrawledPage`], [`ChatbotId`], ...)
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChatConfig, ChatSettings, CrawlConfig, CrawlSettings, DEFAULT_USER_AGENT, LlmConfig,
    MatcherConfig, StorageConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, resolve_api_key,
};
pub use error::{FaqbotError, Result};
pub use types::{
    ChatMessage, ChatSession, Chatbot, ChatbotId, ChatbotProfile, ConversationStats, CrawledPage,
    KnowledgeSnapshot, Lifecycle, MAX_KEYWORD_LEN, NewCrawledPage, QaEntry, RecentQuery,
    SNAPSHOT_SCHEMA_VERSION, Sender, StoredEntry, TopQuestion, normalize_keyword,
    normalize_keywords,
};
