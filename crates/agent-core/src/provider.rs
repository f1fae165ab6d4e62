//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all LLM providers (OpenAI, Anthropic, Ollama, etc.)
//! allowing the agentic loop to work with any backend without code changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{GenerationOptions, LlmProvider};
//!
//! let completion = provider.complete(conversation.messages(), &options, &tools.schemas()).await?;
//! if completion.has_tool_calls() {
//!     // execute tools and call again
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::tool::{ToolCall, ToolSchema};

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4.1", "claude-sonnet-4-0", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate; provider default when unset
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 { 0.7 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".into(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Tools the model wants to call before answering
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// Plain text answer
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Default::default()
        }
    }

    /// Tool-call request, optionally with accompanying text
    pub fn tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            finish_reason: Some(FinishReason::ToolUse),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// Provider metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "openai", "anthropic")
    pub name: String,

    /// Whether tool/function calling is supported
    pub supports_tools: bool,
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get provider information and capabilities
    fn info(&self) -> ProviderInfo;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from messages.
    ///
    /// `tools` is empty when the agent has no tools; providers must then omit
    /// tool definitions from the request entirely.
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        tools: &[ToolSchema],
    ) -> Result<Completion>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, None);
    }

    #[test]
    fn test_completion_constructors() {
        let text = Completion::text("hello");
        assert!(!text.has_tool_calls());
        assert_eq!(text.finish_reason, Some(FinishReason::Stop));

        let calls = Completion::tool_calls("", vec![ToolCall::new("c1", "A_lookup", "{}")]);
        assert!(calls.has_tool_calls());
        assert_eq!(calls.finish_reason, Some(FinishReason::ToolUse));
    }
}
