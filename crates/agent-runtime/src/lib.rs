//! # agent-runtime
//!
//! Model provider clients for the agentic loop.
//!
//! ## Providers
//!
//! - **OpenAI**: Chat Completions API with function calling (any compatible server)
//! - **Anthropic**: Messages API with `tool_use` blocks
//! - **Ollama** (default feature): Local LLM inference, text only
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::ProviderRegistry;
//!
//! let providers = ProviderRegistry::from_env()?;
//! let agent = AgentBuilder::new()
//!     .provider(providers.get(&profile.provider)?)
//!     .tools(aggregator)
//!     .build()?;
//! ```

mod http;

pub mod anthropic;
pub mod openai;
pub mod registry;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use registry::ProviderRegistry;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentError, LlmProvider, Message, Result, Role, Tool, ToolRegistry,
};
