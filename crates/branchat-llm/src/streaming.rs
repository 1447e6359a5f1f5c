use serde::{Deserialize, Serialize};

use crate::buffer_utils::SseLineParser;
use crate::error::{ChatError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Content delta (never empty)
    Message {
        content: String,
    },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    pub role: Option<String>,
    pub content: Option<String>,
}

impl ChatStreamChunk {
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
    }

    pub fn is_done(&self) -> bool {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_ref())
            .is_some()
    }

    fn to_stream_events(&self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(choice) = self.choices.first() {
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Message {
                        content: content.clone(),
                    });
                }
            }

            if let Some(finish_reason) = &choice.finish_reason {
                events.push(StreamEvent::Done {
                    finish_reason: Some(finish_reason.clone()),
                });
            }
        }

        events
    }
}

/// Parses `data:` payloads of the chat-completions stream
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatChunkParser;

impl SseLineParser for ChatChunkParser {
    fn parse_data_line(&self, data: &str) -> Result<Vec<StreamEvent>> {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| ChatError::Parse(format!("Failed to parse chat chunk: {}", e)))?;

        // Some providers report mid-stream failures as an error object frame
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ChatError::Provider(message));
        }

        let chunk: ChatStreamChunk = serde_json::from_value(value)
            .map_err(|e| ChatError::Parse(format!("Failed to parse chat chunk: {}", e)))?;

        Ok(chunk.to_stream_events())
    }
}
