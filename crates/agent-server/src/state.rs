//! Application State

use std::collections::HashMap;
use std::sync::Arc;

use agent_core::{Agent, AgentConfig, AgentError, AgentProfile, ToolSource};
use agent_mcp::{
    ConnectionManager, CredentialService, MemoryRegistry, ToolAggregator, TransportFactory,
};
use agent_runtime::ProviderRegistry;

use crate::config::{Catalog, Settings};
use crate::error::ApiError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Connection pool shared by every agent
    pub manager: Arc<ConnectionManager>,

    /// Per-agent tool resolution over the pool
    pub aggregator: Arc<ToolAggregator>,

    /// Model providers by name
    pub providers: Arc<ProviderRegistry>,

    /// Agent profiles by id
    pub agents: Arc<HashMap<String, AgentProfile>>,

    pub agent_config: AgentConfig,
}

impl AppState {
    pub fn new(
        catalog: Catalog,
        settings: &Settings,
        transports: Arc<dyn TransportFactory>,
        credentials: Option<Arc<dyn CredentialService>>,
        providers: ProviderRegistry,
    ) -> Self {
        let registry = Arc::new(MemoryRegistry::with_catalog(catalog.servers, catalog.bindings));

        let mut manager = ConnectionManager::new(registry, transports, settings.pool.clone());
        if let Some(credentials) = credentials {
            manager = manager.with_credentials(credentials);
        }
        let manager = Arc::new(manager);

        let agents = catalog
            .agents
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();

        Self {
            aggregator: Arc::new(ToolAggregator::new(manager.clone())),
            manager,
            providers: Arc::new(providers),
            agents: Arc::new(agents),
            agent_config: AgentConfig {
                max_iterations: settings.max_iterations,
                ..AgentConfig::default()
            },
        }
    }

    /// Profile plus a ready agent for it
    pub fn agent(&self, agent_id: &str) -> Result<(AgentProfile, Agent), ApiError> {
        let profile = self
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| ApiError::AgentNotFound(agent_id.to_string()))?;

        let provider = self.providers.get(&profile.provider).map_err(|e| match e {
            AgentError::Config(msg) => ApiError::BadRequest(msg),
            other => ApiError::Agent(other),
        })?;

        let tools: Arc<dyn ToolSource> = self.aggregator.clone();
        let agent = Agent::new(provider, tools, self.agent_config.clone());
        Ok((profile, agent))
    }
}
