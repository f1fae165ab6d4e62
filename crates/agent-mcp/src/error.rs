//! Error Types for Tool-Server Connections

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, McpError>;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("failed to connect to {server}: {message}")]
    Connection { server: String, message: String },

    #[error("unsupported server type: {0} (only http and sse are supported)")]
    UnsupportedTransport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("failed to connect to any tool servers: {}", join_failures(.0))]
    NoToolsAvailable(Vec<ServerFailure>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl McpError {
    pub fn connection(server: impl Into<String>, message: impl ToString) -> Self {
        McpError::Connection {
            server: server.into(),
            message: message.to_string(),
        }
    }

    /// Errors that mean "could not get a usable connection"
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            McpError::ServerNotFound(_)
                | McpError::Connection { .. }
                | McpError::UnsupportedTransport(_)
                | McpError::Protocol(_)
        )
    }

    /// Whether the transport itself broke, as opposed to the server refusing a request
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, McpError::Connection { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// One server that could not contribute tools to an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    pub server_id: String,
    pub server_name: String,
    pub message: String,
}

impl std::fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to connect to server {}: {}", self.server_name, self.message)
    }
}

fn join_failures(failures: &[ServerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<McpError> for AgentError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::NoToolsAvailable(failures) => {
                AgentError::NoToolsAvailable(failures.iter().map(ToString::to_string).collect())
            }
            other => AgentError::ToolExecution(other.to_string()),
        }
    }
}
