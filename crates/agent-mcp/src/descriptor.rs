//! Tool-Server Descriptors
//!
//! Catalogue entries describing how to reach a tool server, and which agents
//! may use it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{McpError, Result};

/// Per-request timeout when a descriptor leaves it at zero
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Wire transport for a tool server
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Streamable HTTP: JSON-RPC over POST
    Http,
    /// Legacy server-sent events
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

/// How to reach one tool server.
///
/// `url` and entries named in `sensitive_headers` may be stored encrypted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolServerDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `http` or `sse`; anything else is rejected at connect time
    #[serde(rename = "type")]
    pub server_type: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub encrypted_url: bool,
    #[serde(default)]
    pub sensitive_headers: Vec<String>,
}

impl ToolServerDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        server_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            server_type: server_type.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_secs: 0,
            max_retries: 0,
            encrypted_url: false,
            sensitive_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn transport_kind(&self) -> Result<TransportKind> {
        match self.server_type.to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "sse" => Ok(TransportKind::Sse),
            _ => Err(McpError::UnsupportedTransport(self.server_type.clone())),
        }
    }

    pub fn timeout(&self) -> Duration {
        match self.timeout_secs {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Whether stored values must pass through the credential service
    pub fn needs_decryption(&self) -> bool {
        self.encrypted_url || !self.sensitive_headers.is_empty()
    }

    /// Whether moving from `self` to `updated` invalidates a live connection
    pub fn requires_reconnect(&self, updated: &ToolServerDescriptor) -> bool {
        self.server_type != updated.server_type
            || self.url != updated.url
            || self.headers != updated.headers
            || self.timeout_secs != updated.timeout_secs
            || self.max_retries != updated.max_retries
            || self.encrypted_url != updated.encrypted_url
            || self.sensitive_headers != updated.sensitive_headers
    }
}

/// Agent ↔ server association
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentToolBinding {
    pub agent_id: String,
    pub server_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool { true }

/// Enabled binding joined with the server's display name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundServer {
    pub server_id: String,
    pub server_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind() {
        let http = ToolServerDescriptor::new("1", "A", "http", "https://a.example/mcp");
        assert_eq!(http.transport_kind().unwrap(), TransportKind::Http);

        let stdio = ToolServerDescriptor::new("2", "B", "stdio", "");
        assert!(matches!(stdio.transport_kind(), Err(McpError::UnsupportedTransport(t)) if t == "stdio"));
    }

    #[test]
    fn test_zero_timeout_means_default() {
        let mut desc = ToolServerDescriptor::new("1", "A", "sse", "https://a.example/sse");
        assert_eq!(desc.timeout(), Duration::from_secs(30));
        desc.timeout_secs = 5;
        assert_eq!(desc.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_requires_reconnect() {
        let desc = ToolServerDescriptor::new("1", "A", "http", "https://a.example/mcp");

        let mut renamed = desc.clone();
        renamed.name = "A2".into();
        renamed.description = "new words".into();
        assert!(!desc.requires_reconnect(&renamed));

        let rekeyed = desc.clone().with_header("Authorization", "Bearer new");
        assert!(desc.requires_reconnect(&rekeyed));

        let mut slower = desc.clone();
        slower.timeout_secs = 90;
        assert!(desc.requires_reconnect(&slower));
    }

    #[test]
    fn test_needs_decryption() {
        let mut desc = ToolServerDescriptor::new("1", "A", "http", "u");
        assert!(!desc.needs_decryption());
        desc.sensitive_headers.push("Authorization".into());
        assert!(desc.needs_decryption());
    }
}
