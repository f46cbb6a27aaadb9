//! FAQBot CLI: build support chatbots from Q&A entries and crawled websites.
//!
//! Crawls sites into candidate FAQ entries, manages each chatbot's knowledge
//! base, and answers questions locally before falling back to generation.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
