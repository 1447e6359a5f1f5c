use crate::error::Result;
use crate::streaming::StreamEvent;
use crate::types::Message;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Incremental events of one streaming completion
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Trait for chat-based LLM interactions
///
/// Provides both streaming and non-streaming completions. Implementations
/// report transport, status and parse failures as typed [`ChatError`]s and
/// impose no timeout of their own beyond what the transport does.
///
/// [`ChatError`]: crate::ChatError
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Non-streaming chat completion
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Streaming chat completion
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream>;

    /// Resolve a completion to its full text.
    ///
    /// With a callback, every content delta is handed to it as it arrives
    /// before the full text is returned; without one the non-streaming
    /// endpoint is used.
    async fn send_chat(
        &self,
        request: ChatRequest,
        on_chunk: Option<&mut (dyn for<'a> FnMut(&'a str) + Send)>,
    ) -> Result<String> {
        let Some(callback) = on_chunk else {
            let response = self.chat(request).await?;
            return Ok(response.content.unwrap_or_default());
        };

        let mut stream = self.chat_stream(request).await?;
        let mut text = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Message { content } => {
                    text.push_str(&content);
                    callback(&content);
                }
                StreamEvent::Done { .. } => break,
            }
        }

        Ok(text)
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub options: ChatOptions,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}
