//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Model generation failed (provider or network error)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in the agent's tool set
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution failed
    #[error("{0}")]
    ToolExecution(String),

    /// The agentic loop ran out of rounds without a final answer
    #[error("maximum tool iterations ({0}) reached")]
    IterationLimitExceeded(usize),

    /// Every tool server bound to the agent failed to connect
    #[error("failed to connect to any tool servers: {}", .0.join("; "))]
    NoToolsAvailable(Vec<String>),

    /// The caller stopped listening for events
    #[error("request cancelled by caller")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether this error ends an inference request
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AgentError::ToolNotFound(_) | AgentError::ToolExecution(_) | AgentError::NoToolsAvailable(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(msg) => format!("Failed to generate response: {}", msg),
            AgentError::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            AgentError::ToolNotFound(name) => format!("The tool '{}' is not available.", name),
            AgentError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AgentError::IterationLimitExceeded(_) => {
                "Failed to generate response: maximum tool iterations reached".into()
            }
            AgentError::NoToolsAvailable(_) => "None of this agent's tool servers could be reached.".into(),
            AgentError::Cancelled => "The request was cancelled.".into(),
            AgentError::Config(msg) => format!("Configuration error: {}", msg),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
