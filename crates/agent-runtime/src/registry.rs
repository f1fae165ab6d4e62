//! Provider Registry
//!
//! Maps the provider name on an agent profile ("openai", "anthropic",
//! "ollama") to a configured client.

use std::collections::BTreeMap;
use std::sync::Arc;

use agent_core::{AgentError, LlmProvider, Result};
use tracing::info;

use crate::anthropic::{AnthropicConfig, AnthropicProvider};
use crate::openai::{OpenAiConfig, OpenAiProvider};

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider whose credentials are present in the environment
    pub fn from_env() -> Result<Self> {
        let mut registry = Self::new();

        if let Some(config) = OpenAiConfig::from_env() {
            registry.register("openai", Arc::new(OpenAiProvider::from_config(config)?));
        }
        if let Some(config) = AnthropicConfig::from_env() {
            registry.register("anthropic", Arc::new(AnthropicProvider::from_config(config)?));
        }
        #[cfg(feature = "ollama")]
        registry.register("ollama", Arc::new(crate::ollama::OllamaProvider::from_env()));

        info!(providers = ?registry.names(), "Model providers configured");
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into().to_ascii_lowercase(), provider);
    }

    /// Look up a provider by name, case-insensitively
    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmProvider>> {
        self.providers
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| AgentError::Config(format!("unsupported provider: {}", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
