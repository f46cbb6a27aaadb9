//! Application configuration for FAQBot.
//!
//! User config lives at `~/.faqbot/faqbot.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FaqbotError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "faqbot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".faqbot";

// ---------------------------------------------------------------------------
// Config structs (matching faqbot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    /// Text-generation service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub crawl: CrawlSettings,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub chat: ChatSettings,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.faqbot/faqbot.db".into()
}

/// `[llm]` section. Any OpenAI-compatible chat-completions endpoint works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Generous ceiling: batched prompts carry up to ~30k characters.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://models.github.ai/inference".into()
}
fn default_api_key_env() -> String {
    "FAQBOT_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u64 {
    2000
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Maximum distinct pages a whole-site crawl visits.
    #[serde(default = "default_page_budget")]
    pub page_budget: usize,

    /// Courtesy delay between page fetches, in ms.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Outbound links kept per page.
    #[serde(default = "default_max_links")]
    pub max_links_per_page: usize,

    /// Candidate entries requested from the generator per crawl.
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,

    /// Substitute a single default entry when generation fails.
    #[serde(default = "default_true")]
    pub fallback_entry: bool,

    /// Override the User-Agent sent with page fetches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            page_budget: default_page_budget(),
            delay_ms: default_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_links_per_page: default_max_links(),
            max_questions: default_max_questions(),
            fallback_entry: true,
            user_agent: None,
        }
    }
}

fn default_page_budget() -> usize {
    10
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_max_links() -> usize {
    20
}
fn default_max_questions() -> usize {
    5
}
fn default_true() -> bool {
    true
}

/// `[matcher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Lowest score a match needs before it is returned.
    #[serde(default = "default_min_score")]
    pub min_score: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
        }
    }
}

fn default_min_score() -> u32 {
    2
}

/// `[chat]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Character budget for crawled content used as grounding context.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,

    /// Reply used when a chatbot has no fallback message of its own.
    #[serde(default = "default_apology")]
    pub default_apology: String,

    /// Token ceiling for generated chat replies.
    #[serde(default = "default_reply_max_tokens")]
    pub reply_max_tokens: u64,

    /// Exported snapshot consulted when the database is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            context_chars: default_context_chars(),
            default_apology: default_apology(),
            reply_max_tokens: default_reply_max_tokens(),
            snapshot_path: None,
        }
    }
}

fn default_context_chars() -> usize {
    30_000
}
fn default_reply_max_tokens() -> u64 {
    500
}
fn default_apology() -> String {
    "I'm sorry, I don't have an answer for that. Please contact our support team for assistance."
        .into()
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub page_budget: usize,
    pub delay: Duration,
    pub fetch_timeout: Duration,
    pub max_links_per_page: usize,
    pub max_questions: usize,
    pub fallback_entry: bool,
    pub user_agent: String,
}

/// User-Agent string for crawl requests.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; FAQBot/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        let crawl = &config.crawl;
        Self {
            page_budget: crawl.page_budget,
            delay: Duration::from_millis(crawl.delay_ms),
            fetch_timeout: Duration::from_secs(crawl.fetch_timeout_secs),
            max_links_per_page: crawl.max_links_per_page,
            max_questions: crawl.max_questions,
            fallback_entry: crawl.fallback_entry,
            user_agent: crawl
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

/// Runtime chat configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub context_chars: usize,
    pub default_apology: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ChatConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            context_chars: config.chat.context_chars,
            default_apology: config.chat.default_apology.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.faqbot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FaqbotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.faqbot/faqbot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FaqbotError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FaqbotError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FaqbotError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FaqbotError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FaqbotError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| FaqbotError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the generation API key from the env var named in config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(FaqbotError::config(format!(
            "text-generation API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("FAQBOT_API_KEY"));
        assert!(toml_str.contains("page_budget = 10"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[crawl]
page_budget = 3
delay_ms = 0

[matcher]
min_score = 1
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.crawl.page_budget, 3);
        assert_eq!(config.crawl.fetch_timeout_secs, 10);
        assert_eq!(config.matcher.min_score, 1);
        assert_eq!(config.chat.context_chars, 30_000);
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn crawl_config_from_app_config() {
        let app = AppConfig::default();
        let crawl = CrawlConfig::from(&app);
        assert_eq!(crawl.page_budget, 10);
        assert_eq!(crawl.delay, Duration::from_secs(1));
        assert_eq!(crawl.fetch_timeout, Duration::from_secs(10));
        assert_eq!(crawl.max_links_per_page, 20);
        assert!(crawl.user_agent.contains("FAQBot/"));
    }

    #[test]
    fn chat_config_from_app_config() {
        let chat = ChatConfig::default();
        assert_eq!(chat.context_chars, 30_000);
        assert!(chat.default_apology.starts_with("I'm sorry"));
        assert_eq!(AppConfig::default().chat.reply_max_tokens, 500);
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(
            expand_home("/var/lib/faqbot.db").unwrap(),
            PathBuf::from("/var/lib/faqbot.db")
        );
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "FAQBOT_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
