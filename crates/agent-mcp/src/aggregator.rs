//! Tool Aggregator
//!
//! Turns an agent's enabled server bindings into one namespaced tool set.
//! A server that cannot be reached is reported, not fatal, unless every
//! bound server fails.

use std::sync::Arc;

use agent_core::{AgentToolkit, ServerTool, ToolRegistry, ToolSource};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{McpError, Result, ServerFailure};
use crate::manager::ConnectionManager;

/// Tools gathered for one agent
#[derive(Debug, Default)]
pub struct Aggregation {
    pub tools: ToolRegistry,
    pub failures: Vec<ServerFailure>,
}

pub struct ToolAggregator {
    manager: Arc<ConnectionManager>,
}

impl ToolAggregator {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub async fn aggregate_tools(&self, agent_id: &str) -> Result<Aggregation> {
        let bindings = self.manager.registry().enabled_bindings(agent_id).await?;
        let mut aggregation = Aggregation::default();

        for bound in &bindings {
            let conn = match self.manager.get_connection(&bound.server_id).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(agent = agent_id, server = %bound.server_name, error = %e, "Tool server unavailable");
                    aggregation.failures.push(ServerFailure {
                        server_id: bound.server_id.clone(),
                        server_name: bound.server_name.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for tool in conn.agent_tools() {
                aggregation.tools.register(ServerTool::new(
                    tool,
                    &bound.server_id,
                    &bound.server_name,
                ));
            }
        }

        if aggregation.tools.is_empty() && !aggregation.failures.is_empty() {
            return Err(McpError::NoToolsAvailable(aggregation.failures));
        }

        debug!(
            agent = agent_id,
            servers = bindings.len(),
            tools = aggregation.tools.len(),
            failures = aggregation.failures.len(),
            "Aggregated agent tools"
        );
        Ok(aggregation)
    }
}

#[async_trait]
impl ToolSource for ToolAggregator {
    async fn agent_tools(&self, agent_id: &str) -> agent_core::Result<AgentToolkit> {
        let aggregation = self.aggregate_tools(agent_id).await?;
        Ok(AgentToolkit {
            tools: aggregation.tools,
            failures: aggregation.failures.iter().map(ToString::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ToolServerDescriptor;
    use crate::manager::PoolConfig;
    use crate::registry::MemoryRegistry;
    use crate::transport::{MockReply, MockServer, MockTransportFactory};
    use agent_core::AgentError;
    use serde_json::json;

    struct Fixture {
        aggregator: ToolAggregator,
        registry: Arc<MemoryRegistry>,
        factory: MockTransportFactory,
    }

    fn fixture() -> Fixture {
        let factory = MockTransportFactory::new();
        factory.serve(
            "https://a.example/mcp",
            MockServer::new()
                .tool("lookup", "Look things up", MockReply::Text("42".into()))
                .tool("search", "Search A", MockReply::ToolError("quota exceeded".into())),
        );
        factory.serve(
            "https://c.example/mcp",
            MockServer::new().tool("search", "Search C", MockReply::Text("found".into())),
        );
        // B is catalogued but nothing listens there

        let registry = Arc::new(MemoryRegistry::with_catalog(
            vec![
                ToolServerDescriptor::new("a", "A", "http", "https://a.example/mcp"),
                ToolServerDescriptor::new("b", "B", "sse", "https://b.example/sse"),
                ToolServerDescriptor::new("c", "C", "http", "https://c.example/mcp"),
            ],
            vec![],
        ));
        let manager = Arc::new(ConnectionManager::new(
            registry.clone(),
            Arc::new(factory.clone()),
            PoolConfig::default(),
        ));

        Fixture {
            aggregator: ToolAggregator::new(manager),
            registry,
            factory,
        }
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let fx = fixture();
        fx.registry.bind("agent", "a").await;
        fx.registry.bind("agent", "b").await;

        let aggregation = fx.aggregator.aggregate_tools("agent").await.unwrap();

        assert_eq!(aggregation.tools.names(), vec!["A_lookup", "A_search"]);
        assert_eq!(aggregation.failures.len(), 1);
        assert_eq!(aggregation.failures[0].server_name, "B");
        assert!(aggregation.failures[0].to_string().starts_with("failed to connect to server B"));
    }

    #[tokio::test]
    async fn test_every_server_failing() {
        let fx = fixture();
        fx.registry.bind("agent", "b").await;

        match fx.aggregator.aggregate_tools("agent").await {
            Err(McpError::NoToolsAvailable(failures)) => assert_eq!(failures.len(), 1),
            other => panic!("expected NoToolsAvailable, got {:?}", other.map(|a| a.tools)),
        }

        let err = fx.aggregator.agent_tools("agent").await.unwrap_err();
        assert!(matches!(err, AgentError::NoToolsAvailable(_)));
    }

    #[tokio::test]
    async fn test_no_bindings_is_empty_not_error() {
        let fx = fixture();
        let aggregation = fx.aggregator.aggregate_tools("loner").await.unwrap();
        assert!(aggregation.tools.is_empty());
        assert!(aggregation.failures.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_binding_contributes_nothing() {
        let fx = fixture();
        fx.registry.bind("agent", "a").await;
        fx.registry.bind("agent", "c").await;
        fx.registry.set_enabled("agent", "a", false).await;

        let aggregation = fx.aggregator.aggregate_tools("agent").await.unwrap();
        assert_eq!(aggregation.tools.names(), vec!["C_search"]);
    }

    #[tokio::test]
    async fn test_same_tool_name_on_two_servers() {
        let fx = fixture();
        fx.registry.bind("agent", "a").await;
        fx.registry.bind("agent", "c").await;

        let toolkit = fx.aggregator.agent_tools("agent").await.unwrap();
        assert_eq!(toolkit.tools.names(), vec!["A_lookup", "A_search", "C_search"]);

        let schema = toolkit
            .tools
            .schemas()
            .into_iter()
            .find(|s| s.name == "C_search")
            .unwrap();
        assert_eq!(schema.description, "[C] Search C");
    }

    #[tokio::test]
    async fn test_tool_calls_route_to_owning_server() {
        let fx = fixture();
        fx.registry.bind("agent", "a").await;
        fx.registry.bind("agent", "c").await;
        let toolkit = fx.aggregator.agent_tools("agent").await.unwrap();

        let answer = toolkit
            .tools
            .execute("A_lookup", r#"{"input": "{\"q\": \"meaning\"}"}"#)
            .await
            .unwrap();
        assert_eq!(answer, "42");
        assert_eq!(fx.factory.calls()[0], ("lookup".to_string(), json!({"q": "meaning"})));

        let err = toolkit.tools.execute("A_search", "{}").await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");

        assert_eq!(toolkit.tools.execute("C_search", "").await.unwrap(), "found");
    }

    #[tokio::test]
    async fn test_connections_are_shared_across_agents() {
        let fx = fixture();
        fx.registry.bind("one", "a").await;
        fx.registry.bind("two", "a").await;

        fx.aggregator.aggregate_tools("one").await.unwrap();
        fx.aggregator.aggregate_tools("two").await.unwrap();

        assert_eq!(fx.factory.opened(), 1);
    }
}
