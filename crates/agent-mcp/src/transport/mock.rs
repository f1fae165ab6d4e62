//! Mock Transport
//!
//! In-process tool servers for tests and demos. Servers are keyed by URL, so
//! a connection only succeeds if the pool resolved the URL it was given.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Endpoint, ToolTransport, TransportFactory};
use crate::error::{McpError, Result};
use crate::protocol::{CallToolResult, PROTOCOL_VERSION, ToolInfo};

/// How a mock server answers `tools/call` for one tool
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    /// Result with `isError: true`
    ToolError(String),
    /// The transport breaks mid-call
    Disconnect,
}

#[derive(Clone, Debug, Default)]
pub struct MockServer {
    tools: Vec<ToolInfo>,
    replies: HashMap<String, MockReply>,
    refuse: Option<String>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a tool that answers with `reply`
    pub fn tool(mut self, name: &str, description: &str, reply: MockReply) -> Self {
        self.tools.push(ToolInfo::new(name, description));
        self.replies.insert(name.to_string(), reply);
        self
    }

    /// Reject every connection attempt with `message`
    pub fn refusing(message: &str) -> Self {
        Self {
            refuse: Some(message.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Shared {
    servers: Mutex<HashMap<String, MockServer>>,
    endpoints: Mutex<Vec<Endpoint>>,
    calls: Mutex<Vec<(String, Value)>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory handing out transports to registered mock servers
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    shared: Arc<Shared>,
    open_delay: Duration,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every `open`, widening race windows
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn serve(&self, url: &str, server: MockServer) -> &Self {
        lock(&self.shared.servers).insert(url.to_string(), server);
        self
    }

    /// Transports opened so far
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Transports closed so far
    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Endpoints passed to `open`, in order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        lock(&self.shared.endpoints).clone()
    }

    /// `(tool, arguments)` for every `tools/call` received
    pub fn calls(&self) -> Vec<(String, Value)> {
        lock(&self.shared.calls).clone()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn ToolTransport>> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        lock(&self.shared.endpoints).push(endpoint.clone());

        let server = lock(&self.shared.servers)
            .get(&endpoint.url)
            .cloned()
            .ok_or_else(|| McpError::connection(&endpoint.server_name, "connection refused"))?;
        if let Some(message) = &server.refuse {
            return Err(McpError::connection(&endpoint.server_name, message));
        }

        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransport {
            server,
            name: endpoint.server_name.clone(),
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockTransport {
    server: MockServer,
    name: String,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl MockTransport {
    fn call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params = params.unwrap_or_default();
        let name = params["name"].as_str().unwrap_or_default().to_string();
        lock(&self.shared.calls).push((name.clone(), params["arguments"].clone()));

        let result = match self.server.replies.get(&name) {
            Some(MockReply::Text(text)) => CallToolResult::text(text.clone()),
            Some(MockReply::ToolError(text)) => CallToolResult {
                is_error: true,
                ..CallToolResult::text(text.clone())
            },
            Some(MockReply::Disconnect) => {
                return Err(McpError::connection(&self.name, "connection reset by peer"));
            }
            None => return Err(McpError::Protocol(format!("server error -32602: unknown tool {}", name))),
        };
        Ok(serde_json::to_value(result)?)
    }
}

#[async_trait]
impl ToolTransport for MockTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::connection(&self.name, "transport closed"));
        }
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": self.name, "version": "mock" },
            })),
            "tools/list" => Ok(json!({ "tools": self.server.tools })),
            "tools/call" => self.call_tool(params),
            other => Err(McpError::Protocol(format!("server error -32601: {}", other))),
        }
    }

    async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
