use std::sync::Arc;

use anyhow::{anyhow, Result};
use branchat_llm::{ChatClient, ProviderId, ProviderRegistry};

use crate::canvas::Canvas;
use crate::files::{FileReader, FsFileReader};
use crate::types::CanvasConfig;

/// Builder for constructing a Canvas
pub struct CanvasBuilder {
    registry: ProviderRegistry,
    file_reader: Option<Arc<dyn FileReader>>,
    config: CanvasConfig,
}

impl CanvasBuilder {
    pub fn new() -> Self {
        Self {
            registry: ProviderRegistry::new(),
            file_reader: None,
            config: CanvasConfig::default(),
        }
    }

    /// Use every client of `registry`; clients added afterwards override it
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the client for one provider
    pub fn chat_client(mut self, provider: ProviderId, client: Arc<dyn ChatClient>) -> Self {
        self.registry.register(provider, client);
        self
    }

    /// Set the file reader (defaults to the local filesystem)
    pub fn file_reader(mut self, reader: Arc<dyn FileReader>) -> Self {
        self.file_reader = Some(reader);
        self
    }

    pub fn config(mut self, config: CanvasConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Canvas
    pub fn build(self) -> Result<Canvas> {
        if self.registry.is_empty() {
            return Err(anyhow!("At least one chat client is required"));
        }

        let file_reader = self
            .file_reader
            .unwrap_or_else(|| Arc::new(FsFileReader::new()));

        Ok(Canvas::new(self.registry, file_reader, self.config))
    }
}

impl Default for CanvasBuilder {
    fn default() -> Self {
        Self::new()
    }
}
