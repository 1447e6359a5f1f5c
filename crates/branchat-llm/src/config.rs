// Provider catalogue and client factory
// Every provider speaks the OpenAI chat-completions dialect; they differ only in
// endpoint, model list and credentials.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ChatError, Result};
use crate::openai::OpenAIClient;
use crate::traits::ChatClient;

/// Closed set of supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    DeepSeek,
    Ollama,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::OpenAI, ProviderId::DeepSeek, ProviderId::Ollama];

    pub fn descriptor(&self) -> &'static ProviderDescriptor {
        match self {
            Self::OpenAI => &OPENAI,
            Self::DeepSeek => &DEEPSEEK,
            Self::Ollama => &OLLAMA,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::DeepSeek => "deepseek",
            Self::Ollama => "ollama",
        }
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        ProviderId::OpenAI
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ChatError::Config(format!("Unknown provider: {}", s)))
    }
}

/// Fixed capabilities of a provider
#[derive(Debug)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub name: &'static str,
    pub base_url: &'static str,
    /// Offered models, first one is the default
    pub models: &'static [&'static str],
    /// Local servers run whatever models were pulled into them
    pub open_catalogue: bool,
    pub api_key_env: Option<&'static str>,
}

impl ProviderDescriptor {
    pub fn default_model(&self) -> &'static str {
        self.models[0]
    }

    pub fn supports(&self, model: &str) -> bool {
        self.open_catalogue || self.models.contains(&model)
    }
}

static OPENAI: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::OpenAI,
    name: "OpenAI",
    base_url: "https://api.openai.com/v1",
    models: &["gpt-4o-mini", "gpt-4o", "gpt-4", "gpt-3.5-turbo"],
    open_catalogue: false,
    api_key_env: Some("OPENAI_API_KEY"),
};

static DEEPSEEK: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::DeepSeek,
    name: "DeepSeek",
    base_url: "https://api.deepseek.com/v1",
    models: &["deepseek-chat", "deepseek-reasoner"],
    open_catalogue: false,
    api_key_env: Some("DEEPSEEK_API_KEY"),
};

static OLLAMA: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Ollama,
    name: "Ollama",
    base_url: "http://localhost:11434/v1",
    models: &["llama3.1", "qwen2.5"],
    open_catalogue: true,
    api_key_env: None,
};

/// Provider plus model, chosen explicitly per node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider: ProviderId,
    pub model: String,
}

impl ModelSelection {
    /// Validated against the provider's catalogue
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if !provider.descriptor().supports(&model) {
            return Err(ChatError::UnsupportedModel { provider, model });
        }
        Ok(Self { provider, model })
    }

    pub fn default_for(provider: ProviderId) -> Self {
        Self {
            provider,
            model: provider.descriptor().default_model().to_string(),
        }
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::default_for(ProviderId::default())
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Connection settings for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Overrides the catalogue endpoint (proxies, self-hosted gateways)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            api_key: None,
            base_url: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Read the API key from the provider's environment variable
    pub fn from_env(provider: ProviderId) -> Result<Self> {
        let config = Self::new(provider);
        match provider.descriptor().api_key_env {
            None => Ok(config),
            Some(env) => std::env::var(env)
                .map(|key| config.with_api_key(key))
                .map_err(|_| ChatError::MissingApiKey {
                    provider,
                    env: env.to_string(),
                }),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(self.provider.descriptor().base_url)
    }
}

/// One chat client per provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderId, Arc<dyn ChatClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: ProviderId, client: Arc<dyn ChatClient>) {
        self.clients.insert(provider, client);
    }

    pub fn with_client(mut self, provider: ProviderId, client: Arc<dyn ChatClient>) -> Self {
        self.register(provider, client);
        self
    }

    pub fn get(&self, provider: ProviderId) -> Result<Arc<dyn ChatClient>> {
        self.clients
            .get(&provider)
            .cloned()
            .ok_or(ChatError::ProviderUnavailable(provider))
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        let mut providers: Vec<_> = self.clients.keys().copied().collect();
        providers.sort();
        providers
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Factory for creating chat clients from configuration
pub struct ClientFactory;

impl ClientFactory {
    pub fn create_client(config: ProviderConfig) -> Result<Arc<dyn ChatClient>> {
        let client = OpenAIClient::with_endpoint(config.endpoint(), config.api_key.clone())?;
        Ok(Arc::new(client))
    }

    /// Register every provider whose credentials are available
    pub fn registry_from_env() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();

        for provider in ProviderId::ALL {
            let client = ProviderConfig::from_env(provider).and_then(Self::create_client);
            match client {
                Ok(client) => registry.register(provider, client),
                Err(e) => tracing::debug!(%provider, error = %e, "provider not registered"),
            }
        }

        registry
    }
}
