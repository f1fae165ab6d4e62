//! MCP Protocol
//!
//! JSON-RPC framing and the three operations the pool needs: the
//! initialize handshake, `tools/list` and `tools/call`. Transport-agnostic;
//! bytes move through a [`ToolTransport`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{McpError, Result};
use crate::transport::ToolTransport;

pub const PROTOCOL_VERSION: &str = "2025-06-18";
pub const JSONRPC_VERSION: &str = "2.0";

/// Upper bound on `tools/list` pages, guarding against cursor loops
const MAX_TOOL_PAGES: usize = 64;

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> RpcNotification<'a> {
    pub fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Whether this answers request `id`
    pub fn answers(&self, id: u64) -> bool {
        self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }

    pub fn into_result(self) -> Result<Value> {
        match (self.result, self.error) {
            (_, Some(err)) => Err(McpError::Protocol(format!(
                "server error {}: {}",
                err.code, err.message
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// A tool advertised by a server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<ToolInfo>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Outcome of `tools/call`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart {
                kind: "text".into(),
                text: Some(text.into()),
            }],
            is_error: false,
        }
    }

    /// Text parts joined by newlines; other part kinds are noted by type
    pub fn render(&self) -> String {
        self.content
            .iter()
            .map(|part| match (&part.text, part.kind.as_str()) {
                (Some(text), _) => text.clone(),
                (None, kind) => format!("[{} content]", kind),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Convert the model's argument string into a `tools/call` arguments object.
///
/// Tools are advertised with one string parameter named `input`, so models
/// usually send `{"input": "<json>"}`; that wrapper is unwrapped when the
/// inner string is itself a JSON object.
pub fn map_tool_input(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(json!({}));
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| McpError::Protocol(format!("invalid JSON input: {}", e)))?;

    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(inner)) = map.get("input") {
                    if let Ok(Value::Object(unwrapped)) = serde_json::from_str::<Value>(inner) {
                        return Ok(Value::Object(unwrapped));
                    }
                }
            }
            Ok(Value::Object(map))
        }
        other => Ok(json!({ "input": other })),
    }
}

/// Protocol client over one transport
pub struct McpClient {
    transport: Box<dyn ToolTransport>,
}

impl McpClient {
    pub fn new(transport: Box<dyn ToolTransport>) -> Self {
        Self { transport }
    }

    /// `initialize` followed by `notifications/initialized`
    pub async fn initialize(&self) -> Result<Value> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.transport.request("initialize", Some(params)).await?;
        debug!(
            server_version = ?result.get("protocolVersion"),
            "Tool server initialized"
        );
        self.transport
            .notify("notifications/initialized", None)
            .await?;
        Ok(result)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult =
                serde_json::from_value(self.transport.request("tools/list", params).await?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(McpError::Protocol(format!(
            "tools/list did not finish within {} pages",
            MAX_TOOL_PAGES
        )))
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.transport.request("tools/call", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}
