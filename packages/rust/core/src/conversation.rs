//! Chat runtime: answer from stored Q&A entries first, generate only on a miss.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use faqbot_crawler::truncate_chars;
use faqbot_matcher::KeywordMatcher;
use faqbot_shared::{
    ChatConfig, ChatSession, Chatbot, ChatbotId, CrawledPage, FaqbotError, Lifecycle, Result,
    Sender,
};
use faqbot_storage::KnowledgeStore;

use crate::llm::TextGenerator;

const NO_CONTENT: &str = "No website content available yet.";

/// Where a reply came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplySource {
    /// A stored entry cleared the match threshold.
    Matched { entry_id: String, score: u32 },
    /// The text generator answered from crawled content.
    Generated,
    /// Neither worked; the chatbot's fallback message was used.
    Apology,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

/// One message in a conversation's in-memory history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
}

/// A live conversation with one chatbot.
#[derive(Debug, Clone)]
pub struct Conversation {
    session_id: String,
    chatbot: Chatbot,
    history: Vec<Turn>,
}

impl Conversation {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn chatbot(&self) -> &Chatbot {
        &self.chatbot
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

/// Resolves user messages against a chatbot's knowledge base.
pub struct ConversationRuntime {
    store: Arc<dyn KnowledgeStore>,
    matcher: KeywordMatcher,
    generator: Option<Arc<dyn TextGenerator>>,
    config: ChatConfig,
}

impl ConversationRuntime {
    pub fn new(store: Arc<dyn KnowledgeStore>, matcher: KeywordMatcher, config: ChatConfig) -> Self {
        Self {
            store,
            matcher,
            generator: None,
            config,
        }
    }

    /// Enable generation for messages the matcher cannot answer.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Open a persisted session with `chatbot_id`.
    #[instrument(skip_all, fields(chatbot_id = %chatbot_id))]
    pub async fn start(&self, chatbot_id: &ChatbotId) -> Result<Conversation> {
        let chatbot = self
            .store
            .get_chatbot(chatbot_id)
            .await?
            .ok_or_else(|| FaqbotError::invalid_input(format!("unknown chatbot {chatbot_id}")))?;
        if chatbot.status == Lifecycle::Retired {
            return Err(FaqbotError::invalid_input(format!(
                "chatbot {chatbot_id} is retired"
            )));
        }
        let session = self.store.create_session(chatbot_id).await?;
        info!(session_id = %session.id, "conversation started");

        Ok(Conversation {
            session_id: session.id,
            chatbot,
            history: Vec::new(),
        })
    }

    /// Answer one user message.
    #[instrument(skip_all, fields(session_id = %conversation.session_id))]
    pub async fn respond(&self, conversation: &mut Conversation, message: &str) -> Result<Reply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(FaqbotError::invalid_input("message must not be empty"));
        }

        self.record(conversation, Sender::User, message, None).await;

        let entries = self
            .store
            .list_active_entries(&conversation.chatbot.id)
            .await?;

        let reply = match self.matcher.best_match(message, &entries) {
            Some(hit) => {
                debug!(entry_id = %hit.entry.id, score = hit.score, "matched stored entry");
                Reply {
                    text: hit.entry.entry.answer.clone(),
                    source: ReplySource::Matched {
                        entry_id: hit.entry.id.clone(),
                        score: hit.score,
                    },
                }
            }
            None => self.escalate(&conversation.chatbot, message).await,
        };

        let matched_id = match &reply.source {
            ReplySource::Matched { entry_id, .. } => Some(entry_id.as_str()),
            _ => None,
        };
        self.record(conversation, Sender::Bot, &reply.text, matched_id)
            .await;

        Ok(reply)
    }

    /// End the session and return its final state.
    pub async fn finish(&self, conversation: Conversation) -> Result<ChatSession> {
        let session = self.store.end_session(&conversation.session_id).await?;
        info!(
            session_id = %session.id,
            messages = session.message_count,
            duration_seconds = session.duration_seconds.unwrap_or_default(),
            "conversation finished"
        );
        Ok(session)
    }

    /// Ask the generator, grounded in crawled content. Any failure becomes an
    /// apology.
    async fn escalate(&self, chatbot: &Chatbot, message: &str) -> Reply {
        let Some(generator) = &self.generator else {
            debug!("no match and no generator configured");
            return self.apology(chatbot);
        };

        let pages = match self.store.list_crawled_pages(&chatbot.id).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!(error = %e, "failed to load crawled pages, answering without them");
                Vec::new()
            }
        };
        let prompt = grounded_prompt(&pages, message, self.config.context_chars);

        match generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Reply {
                text: text.trim().to_string(),
                source: ReplySource::Generated,
            },
            Ok(_) => {
                warn!("generator returned empty text");
                self.apology(chatbot)
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                self.apology(chatbot)
            }
        }
    }

    fn apology(&self, chatbot: &Chatbot) -> Reply {
        let text = if chatbot.fallback_message.trim().is_empty() {
            self.config.default_apology.clone()
        } else {
            chatbot.fallback_message.clone()
        };
        Reply {
            text,
            source: ReplySource::Apology,
        }
    }

    /// Append to history and persist. Store errors are logged only.
    async fn record(
        &self,
        conversation: &mut Conversation,
        sender: Sender,
        text: &str,
        matched_entry_id: Option<&str>,
    ) {
        conversation.history.push(Turn {
            sender,
            text: text.to_string(),
        });
        if let Err(e) = self
            .store
            .record_message(&conversation.session_id, sender, text, matched_entry_id)
            .await
        {
            warn!(error = %e, sender = sender.as_str(), "failed to save chat message");
        }
    }
}

/// Build the prompt for a message the matcher could not answer.
pub fn grounded_prompt(pages: &[CrawledPage], question: &str, context_chars: usize) -> String {
    let context = pages
        .iter()
        .map(|p| {
            format!(
                "SOURCE: {}\nTITLE: {}\nCONTENT:\n{}\n---\n",
                p.url,
                p.title.as_deref().unwrap_or("No Title"),
                p.raw_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let context = truncate_chars(&context, context_chars);
    let knowledge = if context.is_empty() {
        NO_CONTENT
    } else {
        context.as_str()
    };

    format!(
        "You are a helpful customer support AI assistant for a website.
Use the following Knowledge Base to answer the user's question.
If the answer is found in the Knowledge Base, be concise and helpful.
If the answer is NOT in the Knowledge Base, you may answer using general knowledge but be polite and mention you don't have specific info on that from the website.
Always check the Knowledge Base first.

Knowledge Base:
{knowledge}

User question: {question}"
    )
}
