//! Core workflows for FAQBot.
//!
//! This crate ties together crawling, summarization, and matching into the two
//! end-to-end flows: turning a website into candidate Q&A entries
//! ([`CrawlOrchestrator`]) and answering chat messages ([`ConversationRuntime`]).

pub mod conversation;
pub mod llm;
pub mod pipeline;
pub mod sources;
pub mod summarize;

pub use conversation::{Conversation, ConversationRuntime, Reply, ReplySource, Turn};
pub use llm::{OpenAiCompatGenerator, TextGenerator};
pub use pipeline::{
    CrawlOrchestrator, CrawlPhase, CrawlReport, ProgressReporter, SilentProgress, commit_selected,
};
pub use sources::{
    DefaultSource, KnowledgeSource, LoadedKnowledge, SnapshotSource, SourceChain, StoreSource,
    build_snapshot, read_snapshot, write_snapshot,
};
pub use summarize::{SourcePage, SummaryGenerator, SummaryRequest};
