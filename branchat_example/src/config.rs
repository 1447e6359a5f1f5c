use std::collections::HashMap;
use std::path::Path;

use branchat::{CanvasConfig, ClientFactory, ModelSelection, ProviderConfig, ProviderId, ProviderRegistry};
use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    #[serde(default)]
    pub canvas: CanvasConfig,
    /// Endpoint overrides keyed by provider id; keys come from the environment
    #[serde(default)]
    pub providers: HashMap<String, ProviderOverride>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderOverride {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl ModelConfig {
    pub fn selection(&self) -> anyhow::Result<ModelSelection> {
        let provider: ProviderId = self.provider.parse()?;
        Ok(ModelSelection::new(provider, self.name.as_str())?)
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. BRANCHAT_* environment variables, `__` between sections
    ///    (e.g. `BRANCHAT_MODEL__NAME=gpt-4o`)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("BRANCHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// One client per provider whose credentials are in the environment.
    /// API keys are never read from config files.
    pub fn registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();

        for provider in ProviderId::ALL {
            let mut provider_config = match ProviderConfig::from_env(provider) {
                Ok(provider_config) => provider_config,
                Err(e) => {
                    tracing::debug!(%provider, "skipping provider: {}", e);
                    continue;
                }
            };

            if let Some(base_url) = self
                .providers
                .get(provider.as_str())
                .and_then(|o| o.base_url.clone())
            {
                provider_config = provider_config.with_base_url(base_url);
            }

            match ClientFactory::create_client(provider_config) {
                Ok(client) => registry.register(provider, client),
                Err(e) => tracing::warn!(%provider, "failed to create client: {}", e),
            }
        }

        registry
    }
}
