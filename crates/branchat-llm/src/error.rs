use thiserror::Error;

use crate::config::ProviderId;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("No client registered for provider {0}")]
    ProviderUnavailable(ProviderId),

    #[error("Model {model} is not offered by {provider}")]
    UnsupportedModel { provider: ProviderId, model: String },

    #[error("{env} is not set (required by {provider})")]
    MissingApiKey { provider: ProviderId, env: String },

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
