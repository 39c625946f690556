use crate::error::{Error, Result};
use crate::session::Role;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

#[derive(Clone, Serialize, Deserialize)]
pub struct AIConfig {
    pub provider: AIProvider,
    pub api_key: String,
    pub model: String,
}

impl fmt::Debug for AIConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AIConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AIProvider {
    Anthropic,
    OpenAI,
}

impl AIProvider {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "openai" => Ok(AIProvider::OpenAI),
            "anthropic" => Ok(AIProvider::Anthropic),
            other => Err(Error::Config(format!(
                "unknown AI provider `{}`. Use 'openai' or 'anthropic'.",
                other
            ))),
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AIProvider::OpenAI => "gpt-4",
            AIProvider::Anthropic => "claude-sonnet-4-6",
        }
    }

    /// Turn one server-sent event into a content fragment, if it carries one.
    fn parse_event(&self, event: &str, data: &str) -> Result<Option<String>> {
        match self {
            AIProvider::OpenAI => parse_openai_event(data),
            AIProvider::Anthropic => parse_anthropic_event(event, data),
        }
    }
}

impl fmt::Display for AIProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AIProvider::OpenAI => write!(f, "OpenAI"),
            AIProvider::Anthropic => write!(f, "Anthropic"),
        }
    }
}

/// One role/content pair as sent to the hosted model.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Incremental content fragments of a streamed reply, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream>;
}

pub struct AIService {
    config: AIConfig,
    http_client: reqwest::Client,
}

impl AIService {
    pub fn new(config: AIConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn openai_request(&self, messages: &[ChatMessage]) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
        });

        self.http_client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&body)
    }

    fn anthropic_request(&self, messages: &[ChatMessage]) -> reqwest::RequestBuilder {
        let body = anthropic_body(&self.config.model, messages);

        self.http_client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&body)
    }
}

#[async_trait]
impl ChatModel for AIService {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        let provider = self.config.provider;
        let request = match provider {
            AIProvider::OpenAI => self.openai_request(messages),
            AIProvider::Anthropic => self.anthropic_request(messages),
        };

        tracing::debug!(%provider, model = %self.config.model, turns = messages.len(), "requesting streamed completion");
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Model(format!(
                "{} API error ({}): {}",
                provider, status, text
            )));
        }

        let fragments = resp.bytes_stream().eventsource().filter_map(move |event| async move {
            match event {
                Ok(event) => provider.parse_event(&event.event, &event.data).transpose(),
                Err(e) => Some(Err(Error::Model(format!("stream error: {}", e)))),
            }
        });

        Ok(Box::pin(fragments))
    }
}

/// Anthropic takes the system prompt outside the message list and refuses an
/// empty one, so a system-only transcript gets an opening user message.
fn anthropic_body(model: &str, messages: &[ChatMessage]) -> serde_json::Value {
    let system = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let mut conversation: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    if conversation.is_empty() {
        conversation.push(ChatMessage {
            role: Role::User,
            content: OPENING_REQUEST.to_string(),
        });
    }

    serde_json::json!({
        "model": model,
        "max_tokens": 4096,
        "system": system,
        "messages": conversation,
        "stream": true,
    })
}

const OPENING_REQUEST: &str = "Now to get started, please introduce yourself.";

fn parse_openai_event(data: &str) -> Result<Option<String>> {
    if data.trim() == "[DONE]" {
        return Ok(None);
    }

    let json: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| Error::Model(format!("malformed stream chunk: {}", e)))?;

    if let Some(message) = json["error"]["message"].as_str() {
        return Err(Error::Model(message.to_string()));
    }

    let content = json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(content)
}

fn parse_anthropic_event(event: &str, data: &str) -> Result<Option<String>> {
    if data.trim().is_empty() {
        return Ok(None);
    }

    let json: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| Error::Model(format!("malformed stream event: {}", e)))?;
    let kind = json["type"].as_str().unwrap_or(event);

    match kind {
        "content_block_delta" => Ok(json["delta"]["text"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)),
        "error" => Err(Error::Model(
            json["error"]["message"]
                .as_str()
                .unwrap_or("unknown streaming error")
                .to_string(),
        )),
        _ => Ok(None),
    }
}
