//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference. Text only:
//! tool definitions are not forwarded, so agents served by Ollama answer
//! without tools.

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo},
    tool::ToolSchema,
};
use async_trait::async_trait;
use ollama_rs::{
    generation::{
        chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    },
    models::ModelOptions as OllamaOptions,
    Ollama,
};

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self { host, port }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    /// Convert agent messages to Ollama format.
    ///
    /// Tool results are replayed as user context since the model never
    /// receives tool definitions.
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::new(MessageRole::System, m.content.clone()),
                Role::User => ChatMessage::new(MessageRole::User, m.content.clone()),
                Role::Assistant => ChatMessage::new(MessageRole::Assistant, m.content.clone()),
                Role::Tool => ChatMessage::new(
                    MessageRole::User,
                    format!(
                        "Result of tool {}: {}",
                        m.name.as_deref().unwrap_or("unknown"),
                        m.content
                    ),
                ),
            })
            .collect()
    }

    /// Convert Ollama response to agent completion
    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        Completion {
            content: response.message.content,
            model: model.to_string(),
            finish_reason: Some(FinishReason::Stop),
            ..Default::default()
        }
    }

    /// Build Ollama generation options
    fn build_options(opts: &GenerationOptions) -> OllamaOptions {
        let options = OllamaOptions::default().temperature(opts.temperature);
        match opts.max_tokens.and_then(|n| i32::try_from(n).ok()) {
            Some(limit) => options.num_predict(limit),
            None => options,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "ollama".into(),
            supports_tools: false,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        tools: &[ToolSchema],
    ) -> Result<Completion> {
        if !tools.is_empty() {
            tracing::warn!(
                model = %options.model,
                tools = tools.len(),
                "Ollama provider does not support tool calling, ignoring tools"
            );
        }

        let request = ChatMessageRequest::new(
            options.model.clone(),
            Self::convert_messages(messages),
        ).options(Self::build_options(options));

        let response = self.client
            .send_chat_messages(request)
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        Ok(Self::convert_completion(response, &options.model))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self.client
            .list_local_models()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        Ok(models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                name: m.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
    }

    #[test]
    fn test_tool_results_become_user_context() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
            Message::tool("42", "call_1", "A_lookup"),
        ];

        let converted = OllamaProvider::convert_messages(&messages);
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[2].content, "Result of tool A_lookup: 42");
    }

    #[test]
    fn test_info_reports_no_tool_support() {
        let provider = OllamaProvider::new("http://localhost", 11434);
        assert!(!provider.info().supports_tools);
    }
}
