//! Tool-Server Registry
//!
//! Read side used by the connection manager and aggregator. Persistence is
//! someone else's job; [`MemoryRegistry`] backs tests and the catalog file.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::descriptor::{AgentToolBinding, BoundServer, ToolServerDescriptor};
use crate::error::Result;

#[async_trait]
pub trait ToolServerRegistry: Send + Sync {
    /// Look up one server; `None` when unknown
    async fn descriptor(&self, server_id: &str) -> Result<Option<ToolServerDescriptor>>;

    /// Enabled bindings for an agent, joined with server names
    async fn enabled_bindings(&self, agent_id: &str) -> Result<Vec<BoundServer>>;
}

#[derive(Default)]
struct Catalog {
    servers: HashMap<String, ToolServerDescriptor>,
    bindings: Vec<AgentToolBinding>,
}

/// In-memory registry
#[derive(Default)]
pub struct MemoryRegistry {
    inner: RwLock<Catalog>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from descriptor and binding lists, e.g. a parsed catalog file
    pub fn with_catalog(
        servers: impl IntoIterator<Item = ToolServerDescriptor>,
        bindings: impl IntoIterator<Item = AgentToolBinding>,
    ) -> Self {
        let catalog = Catalog {
            servers: servers.into_iter().map(|s| (s.id.clone(), s)).collect(),
            bindings: bindings.into_iter().collect(),
        };
        Self {
            inner: RwLock::new(catalog),
        }
    }

    /// Insert or replace a descriptor, returning the previous one
    pub async fn upsert(&self, descriptor: ToolServerDescriptor) -> Option<ToolServerDescriptor> {
        self.inner
            .write()
            .await
            .servers
            .insert(descriptor.id.clone(), descriptor)
    }

    /// Remove a server and its bindings
    pub async fn remove(&self, server_id: &str) -> Option<ToolServerDescriptor> {
        let mut catalog = self.inner.write().await;
        catalog.bindings.retain(|b| b.server_id != server_id);
        catalog.servers.remove(server_id)
    }

    /// Bind a server to an agent (enabled); rebinding re-enables
    pub async fn bind(&self, agent_id: &str, server_id: &str) {
        let mut catalog = self.inner.write().await;
        match catalog
            .bindings
            .iter_mut()
            .find(|b| b.agent_id == agent_id && b.server_id == server_id)
        {
            Some(binding) => binding.enabled = true,
            None => catalog.bindings.push(AgentToolBinding {
                agent_id: agent_id.to_string(),
                server_id: server_id.to_string(),
                enabled: true,
            }),
        }
    }

    /// Toggle a binding; returns false when no such binding exists
    pub async fn set_enabled(&self, agent_id: &str, server_id: &str, enabled: bool) -> bool {
        let mut catalog = self.inner.write().await;
        match catalog
            .bindings
            .iter_mut()
            .find(|b| b.agent_id == agent_id && b.server_id == server_id)
        {
            Some(binding) => {
                binding.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn servers(&self) -> Vec<ToolServerDescriptor> {
        let mut servers: Vec<_> = self.inner.read().await.servers.values().cloned().collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        servers
    }
}

#[async_trait]
impl ToolServerRegistry for MemoryRegistry {
    async fn descriptor(&self, server_id: &str) -> Result<Option<ToolServerDescriptor>> {
        Ok(self.inner.read().await.servers.get(server_id).cloned())
    }

    async fn enabled_bindings(&self, agent_id: &str) -> Result<Vec<BoundServer>> {
        let catalog = self.inner.read().await;
        let bound = catalog
            .bindings
            .iter()
            .filter(|b| b.agent_id == agent_id && b.enabled)
            .map(|b| BoundServer {
                server_id: b.server_id.clone(),
                // A dangling binding still surfaces, so the failure gets reported
                server_name: catalog
                    .servers
                    .get(&b.server_id)
                    .map_or_else(|| b.server_id.clone(), |s| s.name.clone()),
            })
            .collect();
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: &str, name: &str) -> ToolServerDescriptor {
        ToolServerDescriptor::new(id, name, "http", format!("https://{}.example/mcp", id))
    }

    #[tokio::test]
    async fn test_only_enabled_bindings() {
        let registry = MemoryRegistry::with_catalog(vec![server("a", "A"), server("b", "B")], vec![]);
        registry.bind("agent", "a").await;
        registry.bind("agent", "b").await;
        assert!(registry.set_enabled("agent", "b", false).await);

        let bound = registry.enabled_bindings("agent").await.unwrap();
        assert_eq!(
            bound,
            vec![BoundServer { server_id: "a".into(), server_name: "A".into() }]
        );
        assert!(registry.enabled_bindings("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_returns_previous() {
        let registry = MemoryRegistry::new();
        assert!(registry.upsert(server("a", "A")).await.is_none());
        let previous = registry.upsert(server("a", "A2")).await.unwrap();
        assert_eq!(previous.name, "A");
        assert_eq!(registry.descriptor("a").await.unwrap().unwrap().name, "A2");
    }

    #[tokio::test]
    async fn test_remove_drops_bindings() {
        let registry = MemoryRegistry::with_catalog(vec![server("a", "A")], vec![]);
        registry.bind("agent", "a").await;
        registry.remove("a").await;
        assert!(registry.enabled_bindings("agent").await.unwrap().is_empty());
        assert!(!registry.set_enabled("agent", "a", true).await);
    }

    #[tokio::test]
    async fn test_dangling_binding_uses_server_id() {
        let registry = MemoryRegistry::with_catalog(
            vec![],
            vec![AgentToolBinding { agent_id: "agent".into(), server_id: "gone".into(), enabled: true }],
        );
        let bound = registry.enabled_bindings("agent").await.unwrap();
        assert_eq!(bound[0].server_name, "gone");
    }
}
