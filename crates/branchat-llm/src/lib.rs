pub mod types;
pub mod error;
pub mod traits;
pub mod streaming;
pub mod buffer_utils;
pub mod openai;
pub mod config;

pub use traits::{
    ChatClient,
    ChatRequest, ChatResponse, ChatOptions,
    TokenUsage, EventStream,
};

pub use error::{ChatError, Result};
pub use streaming::{StreamEvent, ChatChunkParser};
pub use buffer_utils::{CircularLineBuffer, SseLineParser, parse_sse_stream};
pub use openai::OpenAIClient;
pub use config::{
    ProviderId, ProviderDescriptor, ProviderConfig, ModelSelection,
    ProviderRegistry, ClientFactory,
};
pub use types::{Message, Role};
