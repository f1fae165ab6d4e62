//! # agent-core
//!
//! Provider-agnostic agentic loop: a model is called with the agent's tools,
//! requested tools are executed, and the model is called again until it
//! produces a final answer or the iteration ceiling is reached.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │  │ ToolSource  │  │   LlmProvider       │  │
//! │  │    Loop     │──│ (Registry)  │──│   (Strategy)        │  │
//! │  └──────┬──────┘  └─────────────┘  └─────────────────────┘  │
//! │         └──▶ EventSink (metadata, tokens, tool events, done) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between OpenAI, Anthropic,
//! Ollama or any other provider without changing agent logic. `ToolSource`
//! keeps the loop independent of where tools come from.

pub mod provider;
pub mod tool;
pub mod reasoning;
pub mod message;
pub mod events;
pub mod error;

pub use error::{AgentError, Result};
pub use events::{EventBuffer, EventSink, StreamEvent, ToolCallEvent, ToolEventKind};
pub use message::{ContextMessage, Conversation, Message, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, AgentProfile, InferenceRequest, Reply};
pub use tool::{AgentToolkit, ServerTool, Tool, ToolCall, ToolRegistry, ToolSchema, ToolSource};
