// OpenAI-compatible chat-completions client

use crate::error::{ChatError, Result};
use crate::streaming::ChatChunkParser;
use crate::buffer_utils::parse_sse_stream;
use crate::traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, EventStream, TokenUsage};
use crate::types::Message;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Chat-completions client (HTTP direct, no SDK)
///
/// Works against any endpoint that speaks the OpenAI dialect.
pub struct OpenAIClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenAIClient {
    /// Create new client for the OpenAI API
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(OPENAI_API_BASE, Some(api_key.into()))
    }

    /// Create a client for an arbitrary compatible endpoint; keyless for local servers
    pub fn with_endpoint(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| ChatError::Config("Invalid API key format".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build chat completion request payload
    fn build_chat_request(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        stream: bool,
    ) -> Result<Value> {
        let mut request = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });

        if let (Some(obj), Value::Object(opts)) = (request.as_object_mut(), serde_json::to_value(options)?) {
            obj.extend(opts);
        }

        Ok(request)
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Http { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatClient for OpenAIClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let payload = self.build_chat_request(
            &request.model,
            &request.messages,
            &request.options,
            false,
        )?;

        let raw: OpenAIChatResponse = self
            .post(&payload)
            .await?
            .json()
            .await
            .map_err(|e| ChatError::Parse(format!("Failed to parse response: {}", e)))?;

        // Convert to provider-agnostic response
        let choice = raw.choices.first();
        Ok(ChatResponse {
            content: choice.and_then(|c| c.message.content.clone()),
            usage: raw.usage.as_ref().map(|usage| TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
            finish_reason: choice.and_then(|c| c.finish_reason.clone()),
            raw: serde_json::to_value(&raw)?,
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        let payload = self.build_chat_request(
            &request.model,
            &request.messages,
            &request.options,
            true,
        )?;

        tracing::debug!(model = %request.model, turns = request.messages.len(), "opening chat stream");
        let response = self.post(&payload).await?;

        Ok(parse_sse_stream(response.bytes_stream(), ChatChunkParser))
    }
}

// ============================================================================
// WIRE RESPONSE TYPES (non-streaming)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let client = OpenAIClient::with_endpoint("http://localhost:11434/v1/", None).unwrap();
        let payload = client
            .build_chat_request(
                "llama3.1",
                &[Message::system("Be brief"), Message::human("Hi")],
                &ChatOptions::new().max_tokens(64),
                true,
            )
            .unwrap();

        assert_eq!(client.base_url(), "http://localhost:11434/v1");
        assert_eq!(payload["model"], "llama3.1");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["max_tokens"], 64);
        assert!(payload.get("temperature").is_none());
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["role"], "user");
        assert_eq!(payload["messages"][1]["content"], "Hi");
    }
}
