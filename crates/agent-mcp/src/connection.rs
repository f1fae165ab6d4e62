//! Pooled Connections
//!
//! A handshaken protocol client plus the tool list it discovered. Status and
//! last-use time are tracked here so the reaper can decide what to evict.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agent_core::{AgentError, Tool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use crate::descriptor::TransportKind;
use crate::error::Result;
use crate::protocol::{CallToolResult, McpClient, ToolInfo, map_tool_input};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug)]
struct ConnectionState {
    status: ConnectionStatus,
    last_used: Instant,
    last_error: Option<String>,
}

pub struct Connection {
    id: uuid::Uuid,
    server_id: String,
    server_name: String,
    kind: TransportKind,
    client: McpClient,
    tools: Vec<ToolInfo>,
    state: Mutex<ConnectionState>,
}

impl Connection {
    pub(crate) fn new(
        server_id: impl Into<String>,
        server_name: impl Into<String>,
        kind: TransportKind,
        client: McpClient,
        tools: Vec<ToolInfo>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            server_id: server_id.into(),
            server_name: server_name.into(),
            kind,
            client,
            tools,
            state: Mutex::new(ConnectionState {
                status: ConnectionStatus::Connected,
                last_used: Instant::now(),
                last_error: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unique per connection instance; a reconnect gets a new one
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Tools discovered during the handshake
    pub fn tools(&self) -> &[ToolInfo] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn idle_for(&self) -> Duration {
        self.state().last_used.elapsed()
    }

    pub(crate) fn touch(&self) {
        self.state().last_used = Instant::now();
    }

    pub(crate) fn mark_error(&self, message: impl Into<String>) {
        let mut state = self.state();
        state.status = ConnectionStatus::Error;
        state.last_error = Some(message.into());
    }

    /// Invoke a tool; a broken transport flags the whole connection
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.touch();
        match self.client.call_tool(name, arguments).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_transport_failure() {
                    warn!(server = %self.server_name, tool = name, error = %e, "Transport failed, marking connection");
                    self.mark_error(e.to_string());
                }
                Err(e)
            }
        }
    }

    pub(crate) async fn close(&self) {
        {
            let mut state = self.state();
            if state.status == ConnectionStatus::Connected {
                state.status = ConnectionStatus::Disconnected;
            }
        }
        self.client.close().await;
    }

    /// Adapt every discovered tool to the agent-facing [`Tool`] trait
    pub fn agent_tools(self: &Arc<Self>) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .map(|info| {
                Arc::new(McpTool {
                    connection: Arc::clone(self),
                    info: info.clone(),
                }) as Arc<dyn Tool>
            })
            .collect()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("server_id", &self.server_id)
            .field("server_name", &self.server_name)
            .field("kind", &self.kind)
            .field("tools", &self.tools.len())
            .field("state", &*self.state())
            .finish()
    }
}

/// One server-side tool, callable through its connection
pub struct McpTool {
    connection: Arc<Connection>,
    info: ToolInfo,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        self.info.description.as_deref().unwrap_or_default()
    }

    async fn call(&self, input: &str) -> agent_core::Result<String> {
        let arguments = map_tool_input(input)?;
        let result = self.connection.call_tool(&self.info.name, arguments).await?;

        if result.is_error {
            return Err(AgentError::ToolExecution(result.render()));
        }
        Ok(result.render())
    }
}
