//! Tool System
//!
//! Tools are named, single-argument capabilities discovered from tool servers.
//! The reasoning loop sees them through a [`ToolRegistry`], which guarantees
//! that no two visible tools share a name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID assigned by the provider
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Raw argument payload (JSON text)
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Schema for a tool that takes one opaque string named `input`
    pub fn single_input(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: vec![ParameterSchema {
                name: "input".into(),
                param_type: "string".into(),
                description: "JSON input for the tool".into(),
                required: true,
            }],
        }
    }

    /// Render the parameters as a JSON Schema object
    pub fn parameters_json(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                serde_json::json!({
                    "type": param.param_type,
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool trait - one capability exposed by a tool server
#[async_trait]
pub trait Tool: Send + Sync {
    /// Externally visible name
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Invoke the tool with a JSON-encoded argument string
    async fn call(&self, input: &str) -> Result<String>;

    /// Schema presented to the model
    fn schema(&self) -> ToolSchema {
        ToolSchema::single_input(self.name(), self.description())
    }
}

/// Decorator that namespaces a tool with the server it came from.
///
/// Name becomes `{server}_{tool}`, description is prefixed with `[{server}]`.
pub struct ServerTool {
    inner: Arc<dyn Tool>,
    server_id: String,
    server_name: String,
    name: String,
    description: String,
}

impl ServerTool {
    pub fn new(
        inner: Arc<dyn Tool>,
        server_id: impl Into<String>,
        server_name: impl Into<String>,
    ) -> Self {
        let server_name = server_name.into();
        let name = format!("{}_{}", server_name, inner.name());
        let description = format!("[{}] {}", server_name, inner.description());

        Self {
            inner,
            server_id: server_id.into(),
            server_name,
            name,
            description,
        }
    }

    /// Server that owns the wrapped tool
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Name of the tool on its own server
    pub fn base_name(&self) -> &str {
        self.inner.name()
    }
}

#[async_trait]
impl Tool for ServerTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, input: &str) -> Result<String> {
        self.inner.call(input).await
    }
}

/// Registry for the tools visible to one agent
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> bool {
        self.register_boxed(Arc::new(tool))
    }

    /// Register a shared tool.
    ///
    /// Returns `false` and keeps the existing entry when the name is taken.
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "Duplicate tool name, keeping first registration");
            return false;
        }
        self.tools.insert(name, tool);
        true
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, input: &str) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        tool.call(input).await
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Tools resolved for one agent, with the servers that could not contribute
#[derive(Clone, Debug, Default)]
pub struct AgentToolkit {
    pub tools: ToolRegistry,
    pub failures: Vec<String>,
}

impl AgentToolkit {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            failures: Vec::new(),
        }
    }
}

/// Where the reasoning loop gets an agent's tools from
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Resolve the tool set for an agent
    async fn agent_tools(&self, agent_id: &str) -> Result<AgentToolkit>;
}

/// A fixed registry serves the same tools to every agent
#[async_trait]
impl ToolSource for ToolRegistry {
    async fn agent_tools(&self, _agent_id: &str) -> Result<AgentToolkit> {
        Ok(AgentToolkit::new(self.clone()))
    }
}
