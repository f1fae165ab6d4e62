//! Tool-Server Transports
//!
//! Byte-level plumbing under the protocol client. One implementation per
//! wire style, plus a scripted mock for tests.

mod http;
mod mock;
mod sse;

pub use http::HttpTransport;
pub use mock::{MockReply, MockServer, MockTransportFactory};
pub use sse::SseTransport;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::descriptor::TransportKind;
use crate::error::{McpError, Result};
use crate::protocol::RpcResponse;

/// Everything needed to open a transport, with secrets already decrypted
#[derive(Clone, PartialEq)]
pub struct Endpoint {
    pub server_id: String,
    pub server_name: String,
    pub kind: TransportKind,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // URL and header values may carry credentials
        f.debug_struct("Endpoint")
            .field("server_id", &self.server_id)
            .field("server_name", &self.server_name)
            .field("kind", &self.kind)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub(crate) fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                McpError::connection(&self.server_name, format!("invalid header name {}: {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                McpError::connection(&self.server_name, format!("invalid value for header {}", name))
            })?;
            map.insert(header, value);
        }
        Ok(map)
    }
}

/// A live channel to one tool server
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Send a request and wait for its response
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    /// Fire-and-forget notification
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Release the underlying resources. Later requests fail.
    async fn close(&self);
}

/// Opens transports for endpoints
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn ToolTransport>>;
}

/// Real network transports sharing one HTTP client pool
#[derive(Clone, Default)]
pub struct McpTransportFactory {
    client: reqwest::Client,
}

impl McpTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransportFactory for McpTransportFactory {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn ToolTransport>> {
        match endpoint.kind {
            TransportKind::Http => Ok(Box::new(HttpTransport::new(self.client.clone(), endpoint)?)),
            TransportKind::Sse => Ok(Box::new(SseTransport::connect(self.client.clone(), endpoint).await?)),
        }
    }
}

/// Payloads of the `data:` fields in a text/event-stream body, one per event
pub(crate) fn sse_data_payloads(body: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        if line.is_empty() {
            if !current.is_empty() {
                payloads.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        payloads.push(current.join("\n"));
    }

    payloads
}

/// Find the response for request `id` among JSON-RPC messages
pub(crate) fn find_response(messages: &[String], id: u64) -> Option<RpcResponse> {
    messages
        .iter()
        .filter_map(|raw| serde_json::from_str::<RpcResponse>(raw).ok())
        .find(|response| response.answers(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint {
            server_id: "1".into(),
            server_name: "A".into(),
            kind: TransportKind::Http,
            url: "https://a.example/mcp?token=secret".into(),
            headers: BTreeMap::from([("Authorization".to_string(), "Bearer s3cret".to_string())]),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_sse_body_parsing() {
        let body = "event: message\ndata: {\"a\":1}\n\n: keep-alive\n\ndata: line1\ndata: line2\n";
        assert_eq!(sse_data_payloads(body), vec!["{\"a\":1}", "line1\nline2"]);
    }

    #[test]
    fn test_find_response_by_id() {
        let messages = vec![
            r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#.to_string(),
            r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#.to_string(),
        ];
        let response = find_response(&messages, 7).unwrap();
        assert_eq!(response.into_result().unwrap()["ok"], true);
        assert!(find_response(&messages, 8).is_none());
    }

    #[test]
    fn test_header_map() {
        let map = endpoint().header_map().unwrap();
        assert_eq!(map["authorization"], "Bearer s3cret");

        let mut bad = endpoint();
        bad.headers.insert("X-Bad".into(), "line\nbreak".into());
        assert!(matches!(bad.header_map(), Err(McpError::Connection { .. })));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", endpoint());
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("token=secret"));
    }
}
