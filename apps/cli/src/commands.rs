//! CLI command definitions, routing, and tracing setup.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use faqbot_core::{
    ConversationRuntime, CrawlOrchestrator, CrawlPhase, CrawlReport, DefaultSource,
    OpenAiCompatGenerator, ProgressReporter, ReplySource, SnapshotSource, SourceChain,
    StoreSource, SummaryGenerator, TextGenerator, build_snapshot, commit_selected,
    write_snapshot,
};
use faqbot_crawler::{CollectedPage, CrawlMode, CrawlObserver, Crawler, StopHandle};
use faqbot_matcher::{KeywordMatcher, MatchPolicy};
use faqbot_shared::{
    AppConfig, ChatConfig, ChatbotId, ConversationStats, CrawlConfig, FaqbotError, QaEntry,
    RecentQuery, TopQuestion, expand_home, init_config, load_config,
};
use faqbot_storage::{KnowledgeStore, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FAQBot: customer-support chatbots from your FAQ and your website.
#[derive(Parser)]
#[command(
    name = "faqbot",
    version,
    about = "Build support chatbots from Q&A entries and crawled website content.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file, overriding `[storage] database_path`.
    #[arg(long, env = "FAQBOT_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create, list, or retire chatbots.
    Chatbot {
        #[command(subcommand)]
        action: ChatbotAction,
    },

    /// Crawl a website and turn it into candidate Q&A entries.
    Crawl {
        /// Start URL (`https://` is assumed when no scheme is given).
        url: String,

        /// Chatbot that receives the crawled pages and selected entries.
        #[arg(long)]
        chatbot: String,

        /// Follow same-site links instead of reading a single page.
        #[arg(long)]
        site: bool,

        /// Maximum pages to visit in site mode.
        #[arg(long)]
        max_pages: Option<usize>,

        /// Delay between pages in site mode, in milliseconds.
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Number of entries to ask for.
        #[arg(long)]
        max_questions: Option<usize>,

        /// Candidate indices to save, comma-separated (e.g. `0,2,3`).
        #[arg(long, value_delimiter = ',', conflicts_with = "all")]
        select: Vec<usize>,

        /// Save every candidate.
        #[arg(long)]
        all: bool,

        /// Print the crawl report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage a chatbot's Q&A entries.
    Entries {
        #[command(subcommand)]
        action: EntriesAction,
    },

    /// Show crawl history.
    Pages {
        #[command(subcommand)]
        action: PagesAction,
    },

    /// Ask a chatbot a single question.
    Ask {
        #[arg(long)]
        chatbot: String,

        /// The question.
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Chat with a chatbot interactively. End with `/quit` or Ctrl-D.
    Chat {
        #[arg(long)]
        chatbot: String,
    },

    /// Match a question against stored entries only, as an embedded widget
    /// would: live database, then exported snapshot, then built-in defaults.
    Lookup {
        #[arg(long)]
        chatbot: String,

        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Export a chatbot and its active entries as a JSON snapshot.
    Export {
        #[arg(long)]
        chatbot: String,

        /// Output file. Prints to stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Conversation analytics: totals, most matched entries, latest questions.
    Stats {
        #[arg(long)]
        chatbot: String,

        /// Emit JSON instead of a text summary.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ChatbotAction {
    /// Create a chatbot.
    Create {
        name: String,

        #[arg(long, default_value = "Hi! How can I help you today?")]
        welcome: String,

        /// Reply used when no answer can be found.
        #[arg(long, default_value = "")]
        fallback: String,
    },
    /// List active chatbots.
    List,
    /// Retire a chatbot. Its data is kept.
    Retire { id: String },
}

#[derive(Subcommand)]
pub(crate) enum EntriesAction {
    /// List active entries.
    List {
        #[arg(long)]
        chatbot: String,

        #[arg(long)]
        json: bool,
    },
    /// Add an entry by hand.
    Add {
        #[arg(long)]
        chatbot: String,

        #[arg(long)]
        question: String,

        #[arg(long)]
        answer: String,

        /// Comma-separated keywords.
        #[arg(long, value_delimiter = ',', required = true)]
        keywords: Vec<String>,
    },
    /// Edit an active entry. Omitted fields keep their value.
    Edit {
        id: String,

        #[arg(long)]
        question: Option<String>,

        #[arg(long)]
        answer: Option<String>,

        #[arg(long, value_delimiter = ',')]
        keywords: Option<Vec<String>>,
    },
    /// Retire an entry.
    Delete { id: String },
}

#[derive(Subcommand)]
pub(crate) enum PagesAction {
    /// List crawled pages, oldest first.
    List {
        #[arg(long)]
        chatbot: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "faqbot=info",
        1 => "faqbot=debug",
        _ => "faqbot=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Chatbot { action } => match action {
            ChatbotAction::Create {
                name,
                welcome,
                fallback,
            } => cmd_chatbot_create(db, &name, &welcome, &fallback).await,
            ChatbotAction::List => cmd_chatbot_list(db).await,
            ChatbotAction::Retire { id } => cmd_chatbot_retire(db, &id).await,
        },
        Command::Crawl {
            url,
            chatbot,
            site,
            max_pages,
            delay_ms,
            max_questions,
            select,
            all,
            json,
        } => {
            let opts = CrawlOptions {
                mode: if site {
                    CrawlMode::WholeSite
                } else {
                    CrawlMode::SinglePage
                },
                max_pages,
                delay_ms,
                max_questions,
                selection: if all {
                    Selection::All
                } else if select.is_empty() {
                    Selection::Ask
                } else {
                    Selection::Indices(select)
                },
                json,
            };
            cmd_crawl(db, &url, &chatbot, opts).await
        }
        Command::Entries { action } => match action {
            EntriesAction::List { chatbot, json } => cmd_entries_list(db, &chatbot, json).await,
            EntriesAction::Add {
                chatbot,
                question,
                answer,
                keywords,
            } => cmd_entries_add(db, &chatbot, &question, &answer, &keywords).await,
            EntriesAction::Edit {
                id,
                question,
                answer,
                keywords,
            } => cmd_entries_edit(db, &id, question, answer, keywords).await,
            EntriesAction::Delete { id } => cmd_entries_delete(db, &id).await,
        },
        Command::Pages { action } => match action {
            PagesAction::List { chatbot } => cmd_pages_list(db, &chatbot).await,
        },
        Command::Ask { chatbot, message } => cmd_ask(db, &chatbot, &message.join(" ")).await,
        Command::Chat { chatbot } => cmd_chat(db, &chatbot).await,
        Command::Lookup { chatbot, message } => {
            cmd_lookup(db, &chatbot, &message.join(" ")).await
        }
        Command::Export { chatbot, out } => cmd_export(db, &chatbot, out).await,
        Command::Stats { chatbot, json } => cmd_stats(db, &chatbot, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn parse_chatbot_id(raw: &str) -> Result<ChatbotId> {
    raw.trim()
        .parse()
        .map_err(|e| eyre!("invalid chatbot id '{raw}': {e}"))
}

fn database_path(db: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(expand_home(&config.storage.database_path)?),
    }
}

async fn open_storage(db: Option<PathBuf>, config: &AppConfig) -> Result<Storage> {
    let path = database_path(db, config)?;
    Storage::open(&path)
        .await
        .wrap_err_with(|| format!("failed to open database at {}", path.display()))
}

/// Generator for chat replies, or `None` (with a warning) when no API key is
/// configured.
fn reply_generator(config: &AppConfig) -> Option<Arc<dyn TextGenerator>> {
    match OpenAiCompatGenerator::from_config(config) {
        Ok(generator) => Some(Arc::new(
            generator.with_max_tokens(config.chat.reply_max_tokens),
        )),
        Err(e) => {
            warn!(error = %e, "text generation disabled, unmatched questions get the fallback reply");
            None
        }
    }
}

fn chat_runtime(store: Arc<Storage>, config: &AppConfig) -> ConversationRuntime {
    let matcher = KeywordMatcher::new(MatchPolicy::from(&config.matcher));
    let runtime = ConversationRuntime::new(store, matcher, ChatConfig::from(config));
    match reply_generator(config) {
        Some(generator) => runtime.with_generator(generator),
        None => runtime,
    }
}

// ---------------------------------------------------------------------------
// Chatbots
// ---------------------------------------------------------------------------

async fn cmd_chatbot_create(
    db: Option<PathBuf>,
    name: &str,
    welcome: &str,
    fallback: &str,
) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;
    let bot = storage.create_chatbot(name, welcome, fallback).await?;
    info!(chatbot_id = %bot.id, name = %bot.name, "chatbot created");
    println!("{}", bot.id);
    Ok(())
}

async fn cmd_chatbot_list(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;
    let bots = storage.list_chatbots().await?;
    if bots.is_empty() {
        println!("No chatbots yet. Create one with `faqbot chatbot create <name>`.");
        return Ok(());
    }
    for bot in bots {
        let entries = storage.list_active_entries(&bot.id).await?.len();
        println!("{}  {}  ({entries} entries)", bot.id, bot.name);
    }
    Ok(())
}

async fn cmd_chatbot_retire(db: Option<PathBuf>, id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;
    storage.retire_chatbot(&parse_chatbot_id(id)?).await?;
    println!("Chatbot {id} retired.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Crawl
// ---------------------------------------------------------------------------

enum Selection {
    All,
    Indices(Vec<usize>),
    /// Prompt on a terminal; save nothing otherwise.
    Ask,
}

struct CrawlOptions {
    mode: CrawlMode,
    max_pages: Option<usize>,
    delay_ms: Option<u64>,
    max_questions: Option<usize>,
    selection: Selection,
    json: bool,
}

async fn cmd_crawl(db: Option<PathBuf>, url: &str, chatbot: &str, opts: CrawlOptions) -> Result<()> {
    // Validate API key before doing anything
    let config = load_config()?;
    let generator = OpenAiCompatGenerator::from_config(&config)?;
    let chatbot_id = parse_chatbot_id(chatbot)?;
    let storage = open_storage(db, &config).await?;

    let mut crawl_config = CrawlConfig::from(&config);
    if let Some(max_pages) = opts.max_pages {
        crawl_config.page_budget = max_pages;
    }
    if let Some(delay_ms) = opts.delay_ms {
        crawl_config.delay = Duration::from_millis(delay_ms);
    }
    if let Some(max_questions) = opts.max_questions {
        crawl_config.max_questions = max_questions;
    }

    info!(url, mode = %opts.mode, budget = crawl_config.page_budget, "starting crawl job");

    let orchestrator = CrawlOrchestrator::new(
        Crawler::new(crawl_config)?,
        SummaryGenerator::new(Arc::new(generator)),
    );

    let stop = StopHandle::new();
    let reporter = CliProgress::new(opts.mode);
    spawn_interrupt_handler(stop.clone(), reporter.soft_stop.clone());

    let result = orchestrator
        .run(url, opts.mode, &chatbot_id, &storage, &stop, &reporter)
        .await;
    reporter.finish();

    let report = match result {
        Ok(report) => report,
        Err(FaqbotError::NoContentExtracted { pages_visited }) => {
            return Err(eyre!(
                "could not produce any candidates: no content extracted from {pages_visited} visited page(s)"
            ));
        }
        Err(e) => return Err(eyre!("could not produce any candidates: {e}")),
    };

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.candidates.is_empty() {
        return Err(eyre!(
            "could not produce any candidates from {} page(s)",
            report.pages_collected
        ));
    }

    let indices = match opts.selection {
        Selection::All => (0..report.candidates.len()).collect(),
        Selection::Indices(indices) => indices,
        Selection::Ask if !opts.json && std::io::stdin().is_terminal() => {
            prompt_selection(report.candidates.len())?
        }
        Selection::Ask => Vec::new(),
    };

    if indices.is_empty() {
        println!("Nothing saved. Re-run with --select or --all to keep candidates.");
        return Ok(());
    }

    let stored = commit_selected(&storage, &chatbot_id, &report, &indices).await?;
    println!("Saved {} entr{}.", stored.len(), if stored.len() == 1 { "y" } else { "ies" });
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    /// Let the traversal finish its current page, then summarize.
    StopCrawl,
    Exit,
}

/// Only a running whole-site traversal can stop gracefully, and only once.
fn interrupt_action(stop: &StopHandle, soft_stop: &AtomicBool) -> InterruptAction {
    if soft_stop.load(Ordering::SeqCst) && !stop.is_stopped() {
        InterruptAction::StopCrawl
    } else {
        InterruptAction::Exit
    }
}

/// Listen for Ctrl-C for the rest of the crawl command. Once installed, the
/// listener replaces the default SIGINT handling, so every press must either
/// stop the traversal or exit.
fn spawn_interrupt_handler(stop: StopHandle, soft_stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match interrupt_action(&stop, &soft_stop) {
                InterruptAction::StopCrawl => {
                    stop.stop();
                    warn!("stopping after the current page; press Ctrl-C again to quit");
                }
                InterruptAction::Exit => {
                    eprintln!();
                    std::process::exit(130);
                }
            }
        }
    });
}

fn print_report(report: &CrawlReport) {
    println!();
    println!(
        "  Finished with {} page(s) collected of {} visited and {} candidate(s){}.",
        report.pages_collected,
        report.pages_visited,
        report.candidates.len(),
        if report.stopped { " (stopped early)" } else { "" }
    );
    println!("  Time: {:.1}s", report.elapsed.as_secs_f64());
    for warning in &report.warnings {
        println!("  warning: {}: {}", warning.url, warning.message);
    }
    if let Some(gen_warning) = &report.generation_warning {
        println!("  warning: generation failed ({gen_warning})");
    }
    println!();
    for (i, entry) in report.candidates.iter().enumerate() {
        println!("  [{i}] Q: {}", entry.question);
        println!("      A: {}", entry.answer);
        println!("      keywords: {}", entry.keywords.join(", "));
    }
    println!();
}

fn prompt_selection(count: usize) -> Result<Vec<usize>> {
    print!("Select entries to save (e.g. 0,2 or 'all'; empty for none): ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    parse_selection(&line, count)
}

/// Parse `all`, an empty line, or comma-separated indices.
fn parse_selection(input: &str, count: usize) -> Result<Vec<usize>> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return Ok((0..count).collect());
    }
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| eyre!("'{s}' is not a candidate index"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    mode: CrawlMode,
    /// Raised while a whole-site traversal is running.
    soft_stop: Arc<AtomicBool>,
}

impl CliProgress {
    fn new(mode: CrawlMode) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("static progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self {
            spinner,
            mode,
            soft_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl CrawlObserver for CliProgress {
    fn page_started(&self, url: &Url, visited: usize, budget: usize) {
        self.spinner
            .set_message(format!("Crawling [{visited}/{budget}] {url}"));
    }

    fn page_collected(&self, page: &CollectedPage) {
        self.spinner.println(format!("  ok    {}", page.url));
    }

    fn page_failed(&self, url: &Url, error: &FaqbotError) {
        self.spinner.println(format!("  skip  {url}: {error}"));
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: CrawlPhase) {
        let soft = self.mode == CrawlMode::WholeSite && phase == CrawlPhase::Crawling;
        self.soft_stop.store(soft, Ordering::SeqCst);
        self.spinner.set_message(phase.to_string());
    }
}

// ---------------------------------------------------------------------------
// Entries and pages
// ---------------------------------------------------------------------------

async fn cmd_entries_list(db: Option<PathBuf>, chatbot: &str, json: bool) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;
    let entries = storage.list_active_entries(&parse_chatbot_id(chatbot)?).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No entries.");
    }
    for stored in entries {
        println!("{}", stored.id);
        println!("  Q: {}", stored.entry.question);
        println!("  A: {}", stored.entry.answer);
        println!("  keywords: {}", stored.entry.keywords.join(", "));
    }
    Ok(())
}

async fn cmd_entries_add(
    db: Option<PathBuf>,
    chatbot: &str,
    question: &str,
    answer: &str,
    keywords: &[String],
) -> Result<()> {
    let config = load_config()?;
    let chatbot_id = parse_chatbot_id(chatbot)?;
    let entry = QaEntry::new(question, answer, keywords)?;
    let storage = open_storage(db, &config).await?;
    if storage.get_chatbot(&chatbot_id).await?.is_none() {
        return Err(eyre!("unknown chatbot {chatbot_id}"));
    }
    let stored = storage.create_entry(&chatbot_id, &entry).await?;
    println!("{}", stored.id);
    Ok(())
}

async fn cmd_entries_edit(
    db: Option<PathBuf>,
    id: &str,
    question: Option<String>,
    answer: Option<String>,
    keywords: Option<Vec<String>>,
) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;
    let current = storage
        .get_entry(id)
        .await?
        .ok_or_else(|| eyre!("no entry with id {id}"))?;

    let edited = QaEntry::new(
        question.unwrap_or(current.entry.question),
        answer.unwrap_or(current.entry.answer),
        keywords.unwrap_or(current.entry.keywords),
    )?;
    storage.update_entry(id, &edited).await?;
    println!("Entry {id} updated.");
    Ok(())
}

async fn cmd_entries_delete(db: Option<PathBuf>, id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;
    storage.soft_delete_entry(id).await?;
    println!("Entry {id} deleted.");
    Ok(())
}

async fn cmd_pages_list(db: Option<PathBuf>, chatbot: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;
    let pages = storage.list_crawled_pages(&parse_chatbot_id(chatbot)?).await?;
    if pages.is_empty() {
        println!("No pages crawled yet.");
    }
    for page in pages {
        println!(
            "{}  {}  {}  ({} chars)",
            page.crawled_at.format("%Y-%m-%d %H:%M"),
            page.url,
            page.title.as_deref().unwrap_or("-"),
            page.raw_text.chars().count()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

fn describe(source: &ReplySource) -> String {
    match source {
        ReplySource::Matched { entry_id, score } => format!("matched {entry_id}, score {score}"),
        ReplySource::Generated => "generated".into(),
        ReplySource::Apology => "no answer".into(),
    }
}

async fn cmd_ask(db: Option<PathBuf>, chatbot: &str, message: &str) -> Result<()> {
    let config = load_config()?;
    let chatbot_id = parse_chatbot_id(chatbot)?;
    let storage = Arc::new(open_storage(db, &config).await?);
    let runtime = chat_runtime(storage, &config);

    let mut conversation = runtime.start(&chatbot_id).await?;
    let reply = runtime.respond(&mut conversation, message).await?;
    runtime.finish(conversation).await?;

    println!("{}", reply.text);
    info!(source = %describe(&reply.source), "answered");
    Ok(())
}

async fn cmd_chat(db: Option<PathBuf>, chatbot: &str) -> Result<()> {
    let config = load_config()?;
    let chatbot_id = parse_chatbot_id(chatbot)?;
    let storage = Arc::new(open_storage(db, &config).await?);
    let runtime = chat_runtime(storage, &config);

    let mut conversation = runtime.start(&chatbot_id).await?;
    let bot_name = conversation.chatbot().name.clone();
    println!("{bot_name}: {}", conversation.chatbot().welcome_message);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let reply = runtime.respond(&mut conversation, line).await?;
        println!("{bot_name}: {}", reply.text);
        tracing::debug!(source = %describe(&reply.source), "reply");
    }

    let session = runtime.finish(conversation).await?;
    println!(
        "Session ended after {} message(s).",
        session.message_count
    );
    Ok(())
}

async fn cmd_lookup(db: Option<PathBuf>, chatbot: &str, message: &str) -> Result<()> {
    let config = load_config()?;
    let chatbot_id = parse_chatbot_id(chatbot)?;

    let mut chain = SourceChain::new();
    match open_storage(db, &config).await {
        Ok(storage) => {
            let store: Arc<dyn KnowledgeStore> = Arc::new(storage);
            chain = chain.with(StoreSource::new(store));
        }
        Err(e) => warn!(error = %e, "database unavailable, skipping store source"),
    }
    if let Some(path) = &config.chat.snapshot_path {
        chain = chain.with(SnapshotSource::new(expand_home(path)?));
    }
    chain = chain.with(DefaultSource::new(config.chat.default_apology.clone()));

    let loaded = chain.load(&chatbot_id).await?;
    let matcher = KeywordMatcher::new(MatchPolicy::from(&config.matcher));
    match matcher.best_match(message, &loaded.snapshot.entries) {
        Some(hit) => {
            println!("{}", hit.entry.entry.answer);
            info!(source = loaded.source, entry_id = %hit.entry.id, score = hit.score, "matched");
        }
        None => {
            let fallback = &loaded.snapshot.chatbot.fallback_message;
            if fallback.trim().is_empty() {
                println!("{}", config.chat.default_apology);
            } else {
                println!("{fallback}");
            }
            info!(source = loaded.source, "no match");
        }
    }
    Ok(())
}

async fn cmd_export(db: Option<PathBuf>, chatbot: &str, out: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let chatbot_id = parse_chatbot_id(chatbot)?;
    let storage = open_storage(db, &config).await?;
    let bot = storage
        .get_chatbot(&chatbot_id)
        .await?
        .ok_or_else(|| eyre!("unknown chatbot {chatbot_id}"))?;
    let entries = storage.list_active_entries(&chatbot_id).await?;
    let snapshot = build_snapshot(&bot, entries);

    match out {
        Some(path) => {
            write_snapshot(&path, &snapshot)?;
            println!(
                "Exported {} entries to {}",
                snapshot.entries.len(),
                path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

const TOP_QUESTIONS: u32 = 10;
const RECENT_QUERIES: u32 = 20;

#[derive(Serialize)]
struct StatsReport {
    stats: ConversationStats,
    response_rate_percent: u64,
    top_questions: Vec<TopQuestion>,
    recent_queries: Vec<RecentQuery>,
}

async fn cmd_stats(db: Option<PathBuf>, chatbot: &str, json: bool) -> Result<()> {
    let config = load_config()?;
    let chatbot_id = parse_chatbot_id(chatbot)?;
    let storage = open_storage(db, &config).await?;
    if storage.get_chatbot(&chatbot_id).await?.is_none() {
        return Err(eyre!("unknown chatbot {chatbot_id}"));
    }

    let stats = storage.conversation_stats(&chatbot_id).await?;
    let report = StatsReport {
        response_rate_percent: stats.response_rate_percent(),
        stats,
        top_questions: storage.top_questions(&chatbot_id, TOP_QUESTIONS).await?,
        recent_queries: storage.recent_queries(&chatbot_id, RECENT_QUERIES).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_stats(&report));
    }
    Ok(())
}

fn render_stats(report: &StatsReport) -> String {
    let stats = &report.stats;
    let mut out = String::new();
    out.push_str(&format!("Conversations:  {}\n", stats.total_conversations));
    out.push_str(&format!("Messages:       {}\n", stats.total_messages));
    out.push_str(&format!("Avg duration:   {}s\n", stats.avg_duration_seconds));
    out.push_str(&format!("Active:         {}\n", stats.active_conversations));
    out.push_str(&format!(
        "Response rate:  {}% ({} engaged)\n",
        report.response_rate_percent, stats.engaged_conversations
    ));
    out.push_str(&format!(
        "Resolved:       {}  Unresolved: {}\n",
        stats.resolved, stats.unresolved
    ));

    out.push_str("\nTop questions:\n");
    if report.top_questions.is_empty() {
        out.push_str("  (none)\n");
    }
    for top in &report.top_questions {
        out.push_str(&format!("  {:>4}  {}\n", top.hits, top.question));
    }

    out.push_str("\nRecent queries:\n");
    if report.recent_queries.is_empty() {
        out.push_str("  (none)\n");
    }
    for query in &report.recent_queries {
        out.push_str(&format!(
            "  {}  {}\n",
            query.sent_at.format("%Y-%m-%d %H:%M"),
            query.text
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
