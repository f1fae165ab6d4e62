//! Server Configuration
//!
//! Process settings come from the environment (after `.env` is loaded);
//! tool servers, agent profiles and their bindings come from a TOML catalog.
//!
//! ```toml
//! [[servers]]
//! id = "github"
//! name = "GitHub"
//! type = "http"
//! url = "https://mcp.example.com/github"
//! headers = { Authorization = "Bearer ..." }
//! sensitive_headers = ["Authorization"]
//!
//! [[agents]]
//! id = "triage"
//! name = "Triage"
//! provider = "openai"
//! model = "gpt-4.1"
//! system_prompt = "You triage issues."
//!
//! [[bindings]]
//! agent_id = "triage"
//! server_id = "github"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use agent_core::AgentProfile;
use agent_core::reasoning::DEFAULT_MAX_ITERATIONS;
use agent_mcp::{AgentToolBinding, PoolConfig, ToolServerDescriptor};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{info, warn};

/// Process-level settings
#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    pub catalog_path: PathBuf,

    /// Passphrase for encrypted descriptor fields
    pub encryption_key: Option<String>,

    pub max_iterations: usize,
    pub pool: PoolConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            catalog_path: PathBuf::from("catalog.toml"),
            encryption_key: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            pool: PoolConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or empty values keep defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(addr) = get("BIND_ADDR") {
            settings.bind_addr = addr;
        }
        if let Some(path) = get("CATALOG_PATH") {
            settings.catalog_path = PathBuf::from(path);
        }
        settings.encryption_key = get("ENCRYPTION_KEY");

        if let Some(max) = parse_var::<usize>("AGENT_MAX_ITERATIONS", get("AGENT_MAX_ITERATIONS"))? {
            if max == 0 {
                bail!("AGENT_MAX_ITERATIONS must be at least 1");
            }
            settings.max_iterations = max;
        }
        if let Some(secs) = parse_var::<u64>("POOL_IDLE_TIMEOUT_SECS", get("POOL_IDLE_TIMEOUT_SECS"))? {
            settings.pool.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("POOL_REAP_INTERVAL_SECS", get("POOL_REAP_INTERVAL_SECS"))? {
            if secs == 0 {
                bail!("POOL_REAP_INTERVAL_SECS must be at least 1");
            }
            settings.pool.reap_interval = Duration::from_secs(secs);
        }

        Ok(settings)
    }
}

fn parse_var<T>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.trim().parse::<T>().with_context(|| format!("invalid {name}: {v:?}")))
        .transpose()
}

/// Tool servers, agent profiles and bindings
#[derive(Debug, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub servers: Vec<ToolServerDescriptor>,
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
    #[serde(default)]
    pub bindings: Vec<AgentToolBinding>,
}

impl Catalog {
    /// Read the catalog file; a missing file yields an empty catalog
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Catalog file not found, starting with no agents");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let catalog = Self::parse(&content)
            .with_context(|| format!("failed to load catalog {}", path.display()))?;

        info!(
            servers = catalog.servers.len(),
            agents = catalog.agents.len(),
            bindings = catalog.bindings.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let catalog: Self = toml::from_str(content).context("invalid catalog TOML")?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Duplicate ids are fatal; bindings to unknown ids only warn
    fn validate(&self) -> Result<()> {
        let mut server_ids = HashSet::new();
        for server in &self.servers {
            if !server_ids.insert(server.id.as_str()) {
                bail!("duplicate server id: {}", server.id);
            }
        }

        let mut agent_ids = HashSet::new();
        for agent in &self.agents {
            if !agent_ids.insert(agent.id.as_str()) {
                bail!("duplicate agent id: {}", agent.id);
            }
        }

        for binding in &self.bindings {
            if !agent_ids.contains(binding.agent_id.as_str()) {
                warn!(agent = %binding.agent_id, server = %binding.server_id, "Binding references unknown agent");
            }
            if !server_ids.contains(binding.server_id.as_str()) {
                warn!(agent = %binding.agent_id, server = %binding.server_id, "Binding references unknown server");
            }
        }
        Ok(())
    }
}
