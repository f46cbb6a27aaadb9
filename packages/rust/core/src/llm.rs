//! Text-generation collaborator and its OpenAI-compatible HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use faqbot_shared::{AppConfig, FaqbotError, LlmConfig, Result, resolve_api_key};

/// Produces text for a prompt. Implementations own their model, limits and
/// credentials; callers only see prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire
/// format (GitHub Models, OpenRouter, local servers).
#[derive(Debug, Clone)]
pub struct OpenAiCompatGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u64,
    timeout: Duration,
}

impl OpenAiCompatGenerator {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FaqbotError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Build from app config, reading the key from the configured env var.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        Self::new(&config.llm, Some(api_key))
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatGenerator {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.chars().count()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut rb = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&req);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }

        let resp = rb.send().await.map_err(|e| {
            if e.is_timeout() {
                FaqbotError::generation(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                ))
            } else {
                FaqbotError::generation(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FaqbotError::generation(format!(
                "chat.completions HTTP {status}"
            )));
        }

        let parsed: ChatCompletionsResponse = resp
            .json()
            .await
            .map_err(|e| FaqbotError::generation(format!("malformed response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(response_chars = text.chars().count(), "generation complete");
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
    max_tokens: u64,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/inference/", server.uri()),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn sends_prompt_and_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inference/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 500,
                "messages": [{ "role": "user", "content": "hello" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "hi there" } }]
            })))
            .mount(&server)
            .await;

        let generator = OpenAiCompatGenerator::new(&config_for(&server), Some("test-key".into()))
            .unwrap()
            .with_max_tokens(500);
        assert_eq!(generator.generate("hello").await.unwrap(), "hi there");
    }

    #[tokio::test]
    async fn http_error_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let generator = OpenAiCompatGenerator::new(&config_for(&server), None).unwrap();
        let err = generator.generate("hello").await.unwrap_err();
        assert!(matches!(err, FaqbotError::Generation(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn missing_content_is_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": null } }]
            })))
            .mount(&server)
            .await;

        let generator = OpenAiCompatGenerator::new(&config_for(&server), None).unwrap();
        assert_eq!(generator.generate("hello").await.unwrap(), "");
    }
}
