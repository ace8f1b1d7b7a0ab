//! Answer synthesis over retrieved review snippets.
//!
//! The [`AnswerSynthesizer`] trait is the seam between retrieval and the
//! language model. [`OpenAIChat`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint; [`DisabledSynthesizer`] fails every call
//! so the rest of the pipeline can run without a model configured.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::embedding::post_with_retry;
use crate::models::ConversationHistory;
use crate::prompts;

#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    /// Rewrite a follow-up into a standalone question using `history`.
    async fn condense_question(&self, question: &str, history: &ConversationHistory)
        -> Result<String>;

    /// Answer `question` from `context` only.
    async fn synthesize(
        &self,
        context: &[String],
        question: &str,
        history: &ConversationHistory,
    ) -> Result<String>;
}

pub struct DisabledSynthesizer;

#[async_trait]
impl AnswerSynthesizer for DisabledSynthesizer {
    async fn condense_question(&self, _: &str, _: &ConversationHistory) -> Result<String> {
        bail!("LLM is disabled; set [llm] provider = \"openai\" in config")
    }

    async fn synthesize(&self, _: &[String], _: &str, _: &ConversationHistory) -> Result<String> {
        bail!("LLM is disabled; set [llm] provider = \"openai\" in config")
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat completion client.
pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_answer_words: usize,
    max_retries: u32,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_answer_words: config.max_answer_words,
            max_retries: config.max_retries,
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        let body = serde_json::to_value(&request)?;
        let json = post_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.base_url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI chat",
        )
        .await?;

        parse_chat_response(json)
    }
}

#[async_trait]
impl AnswerSynthesizer for OpenAIChat {
    async fn condense_question(
        &self,
        question: &str,
        history: &ConversationHistory,
    ) -> Result<String> {
        let prompt = prompts::condense_prompt(question, history);
        let standalone = self
            .complete(vec![ChatMessage {
                role: "user".into(),
                content: prompt,
            }])
            .await?;
        tracing::debug!(original = question, standalone = %standalone, "condensed question");
        Ok(standalone)
    }

    async fn synthesize(
        &self,
        context: &[String],
        question: &str,
        history: &ConversationHistory,
    ) -> Result<String> {
        let mut messages: Vec<ChatMessage> = history
            .turns()
            .iter()
            .map(|t| ChatMessage {
                role: t.role.as_str().to_string(),
                content: t.content.clone(),
            })
            .collect();
        messages.push(ChatMessage {
            role: "user".into(),
            content: prompts::answer_prompt(context, question, self.max_answer_words),
        });
        self.complete(messages).await
    }
}

fn parse_chat_response(json: serde_json::Value) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_value(json).context("invalid chat completion response")?;
    match response.choices.into_iter().next() {
        Some(choice) => Ok(choice.message.content.trim().to_string()),
        None => bail!("chat completion returned no choices"),
    }
}

pub fn create_synthesizer(config: &LlmConfig) -> Result<Box<dyn AnswerSynthesizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSynthesizer)),
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown llm provider: '{}'", other),
    }
}
