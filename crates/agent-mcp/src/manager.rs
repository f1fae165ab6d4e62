//! Connection Manager
//!
//! Keyed pool of live tool-server connections.
//!
//! ```text
//! get_connection(id)
//!   ├─ pooled & connected ──▶ touch, reuse
//!   └─ else ──▶ per-server gate ──▶ re-check ──▶ descriptor ──▶ decrypt
//!                                   ──▶ open transport ──▶ initialize ──▶ tools/list ──▶ pool
//! ```
//!
//! The pool lock is never held across network I/O; creation for one server
//! only blocks other callers asking for that same server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionStatus};
use crate::credentials::{CredentialService, decrypt_headers};
use crate::descriptor::ToolServerDescriptor;
use crate::error::{CredentialError, McpError, Result};
use crate::protocol::McpClient;
use crate::registry::ToolServerRegistry;
use crate::transport::{Endpoint, TransportFactory};

/// Reaper and eviction settings
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Connections unused for longer than this are closed
    pub idle_timeout: Duration,

    /// How often the reaper sweeps the pool
    pub reap_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10 * 60),
            reap_interval: Duration::from_secs(30),
        }
    }
}

/// Result of a forced reconnect
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionTest {
    pub server_id: String,
    pub success: bool,
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ConnectionManager {
    registry: Arc<dyn ToolServerRegistry>,
    credentials: Option<Arc<dyn CredentialService>>,
    transports: Arc<dyn TransportFactory>,
    config: PoolConfig,
    pool: RwLock<HashMap<String, Arc<Connection>>>,
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// One caller's share of a per-server gate; the entry goes away with its last holder
struct Gate<'a> {
    gates: &'a Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    server_id: String,
    lock: Arc<AsyncMutex<()>>,
}

impl Gate<'_> {
    async fn enter(&self) -> AsyncMutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for Gate<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        // Two references left: the map's and ours
        if gates
            .get(&self.server_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2)
        {
            gates.remove(&self.server_id);
        }
    }
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<dyn ToolServerRegistry>,
        transports: Arc<dyn TransportFactory>,
        config: PoolConfig,
    ) -> Self {
        Self {
            registry,
            credentials: None,
            transports,
            config,
            pool: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Enable decryption of encrypted descriptor fields
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialService>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn registry(&self) -> &Arc<dyn ToolServerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Pooled connection for a server, creating it if absent or unhealthy
    pub async fn get_connection(&self, server_id: &str) -> Result<Arc<Connection>> {
        if let Some(conn) = self.pooled(server_id).await {
            conn.touch();
            return Ok(conn);
        }

        let gate = self.gate(server_id);
        let _creating = gate.enter().await;

        // Someone else may have finished creating it while we waited
        if let Some(conn) = self.pooled(server_id).await {
            conn.touch();
            return Ok(conn);
        }

        let conn = Arc::new(self.create(server_id).await?);
        let replaced = self
            .pool
            .write()
            .await
            .insert(server_id.to_string(), Arc::clone(&conn));
        if let Some(old) = replaced {
            debug!(server_id, old = %old.id(), "Replacing unhealthy connection");
            old.close().await;
        }

        Ok(conn)
    }

    /// Close and forget the pooled connection, if any
    pub async fn invalidate_connection(&self, server_id: &str) {
        let gate = self.gate(server_id);
        let _creating = gate.enter().await;

        let removed = self.pool.write().await.remove(server_id);
        if let Some(conn) = removed {
            info!(server = %conn.server_name(), connection = %conn.id(), "Connection invalidated");
            conn.close().await;
        }
    }

    /// Drop any pooled connection and connect from scratch
    pub async fn test_connection(&self, server_id: &str) -> ConnectionTest {
        self.invalidate_connection(server_id).await;

        match self.get_connection(server_id).await {
            Ok(conn) if conn.tools().is_empty() => ConnectionTest {
                server_id: server_id.to_string(),
                success: false,
                tools: Vec::new(),
                error: Some("connection successful but no tools available".into()),
            },
            Ok(conn) => ConnectionTest {
                server_id: server_id.to_string(),
                success: true,
                tools: conn.tool_names(),
                error: None,
            },
            Err(e) => ConnectionTest {
                server_id: server_id.to_string(),
                success: false,
                tools: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Names of the tools a server offers
    pub async fn list_server_tools(&self, server_id: &str) -> Result<Vec<String>> {
        Ok(self.get_connection(server_id).await?.tool_names())
    }

    /// React to a descriptor edit; reconnect-relevant changes drop the connection
    pub async fn descriptor_changed(&self, previous: &ToolServerDescriptor, current: &ToolServerDescriptor) {
        if previous.requires_reconnect(current) {
            self.invalidate_connection(&current.id).await;
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.pool.read().await.len()
    }

    /// Close connections that are idle too long or in error; returns how many
    pub async fn evict_stale(&self) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let stale: Vec<Arc<Connection>> = {
            let mut pool = self.pool.write().await;
            let ids: Vec<String> = pool
                .iter()
                .filter(|(_, conn)| {
                    conn.status() == ConnectionStatus::Error || conn.idle_for() > idle_timeout
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pool.remove(id)).collect()
        };

        for conn in &stale {
            debug!(
                server = %conn.server_name(),
                status = ?conn.status(),
                idle_secs = conn.idle_for().as_secs(),
                "Evicting connection"
            );
            conn.close().await;
        }
        if !stale.is_empty() {
            info!(evicted = stale.len(), "Reaped tool server connections");
        }
        stale.len()
    }

    /// Start the periodic sweep. Stops once the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        let period = self.config.reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    debug!("Connection manager dropped, reaper exiting");
                    break;
                };
                manager.evict_stale().await;
            }
        })
    }

    async fn pooled(&self, server_id: &str) -> Option<Arc<Connection>> {
        self.pool
            .read()
            .await
            .get(server_id)
            .filter(|conn| conn.is_connected())
            .cloned()
    }

    fn gate(&self, server_id: &str) -> Gate<'_> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Gate {
            gates: &self.gates,
            server_id: server_id.to_string(),
            lock: Arc::clone(gates.entry(server_id.to_string()).or_default()),
        }
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn create(&self, server_id: &str) -> Result<Connection> {
        let descriptor = self
            .registry
            .descriptor(server_id)
            .await?
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;

        let endpoint = self.resolve_endpoint(&descriptor)?;
        if endpoint.url.is_empty() {
            return Err(McpError::connection(&descriptor.name, "URL is required"));
        }

        let transport = self.transports.open(&endpoint).await?;
        let client = McpClient::new(transport);

        let tools = match handshake(&client).await {
            Ok(tools) => tools,
            Err(e) => {
                client.close().await;
                return Err(e);
            }
        };

        info!(
            server = %descriptor.name,
            transport = %endpoint.kind,
            tools = tools.len(),
            "Connected to tool server"
        );

        Ok(Connection::new(
            &descriptor.id,
            &descriptor.name,
            endpoint.kind,
            client,
            tools,
        ))
    }

    /// Descriptor → endpoint with secrets decrypted
    fn resolve_endpoint(&self, descriptor: &ToolServerDescriptor) -> Result<Endpoint> {
        let mut url = descriptor.url.clone();
        let mut headers = descriptor.headers.clone();

        if descriptor.needs_decryption() {
            let credentials = self.credentials.as_deref().ok_or_else(|| {
                CredentialError::InvalidKey("no credential service configured".into())
            })?;

            if descriptor.encrypted_url {
                match credentials.decrypt(&descriptor.url) {
                    Ok(plain) => url = plain,
                    Err(e) => warn!(
                        server_id = %descriptor.id,
                        error = %e,
                        "Failed to decrypt URL, assuming unencrypted"
                    ),
                }
            }

            if !descriptor.sensitive_headers.is_empty() {
                match decrypt_headers(credentials, &descriptor.headers, &descriptor.sensitive_headers) {
                    Ok(plain) => headers = plain,
                    Err(e) => warn!(
                        server_id = %descriptor.id,
                        error = %e,
                        "Failed to decrypt headers, using stored values"
                    ),
                }
            }
        }

        Ok(Endpoint {
            server_id: descriptor.id.clone(),
            server_name: descriptor.name.clone(),
            kind: descriptor.transport_kind()?,
            url,
            headers,
            timeout: descriptor.timeout(),
        })
    }
}

async fn handshake(client: &McpClient) -> Result<Vec<crate::protocol::ToolInfo>> {
    client.initialize().await?;
    client.list_tools().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{AesGcmCredentials, encrypt_headers};
    use crate::registry::MemoryRegistry;
    use crate::transport::{MockReply, MockServer, MockTransportFactory};

    const URL_A: &str = "https://a.example/mcp";

    fn lookup_server() -> MockServer {
        MockServer::new()
            .tool("lookup", "Look things up", MockReply::Text("42".into()))
            .tool("flaky", "Drops the line", MockReply::Disconnect)
    }

    fn setup(
        descriptors: Vec<ToolServerDescriptor>,
    ) -> (Arc<ConnectionManager>, MockTransportFactory, Arc<MemoryRegistry>) {
        let factory = MockTransportFactory::new();
        factory.serve(URL_A, lookup_server());
        let registry = Arc::new(MemoryRegistry::with_catalog(descriptors, vec![]));
        let manager = ConnectionManager::new(
            registry.clone(),
            Arc::new(factory.clone()),
            PoolConfig::default(),
        );
        (Arc::new(manager), factory, registry)
    }

    fn server_a() -> ToolServerDescriptor {
        ToolServerDescriptor::new("a", "A", "http", URL_A)
    }

    fn credentials() -> Arc<AesGcmCredentials> {
        Arc::new(AesGcmCredentials::from_passphrase("pool-test-key").unwrap())
    }

    #[tokio::test]
    async fn test_connection_is_reused() {
        let (manager, factory, _) = setup(vec![server_a()]);

        let first = manager.get_connection("a").await.unwrap();
        let second = manager.get_connection("a").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.opened(), 1);
        assert_eq!(first.tool_names(), vec!["lookup", "flaky"]);
        assert_eq!(manager.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_create_once() {
        let factory = MockTransportFactory::new().with_open_delay(Duration::from_millis(20));
        factory.serve(URL_A, lookup_server());
        let registry = Arc::new(MemoryRegistry::with_catalog(vec![server_a()], vec![]));
        let manager = Arc::new(ConnectionManager::new(
            registry,
            Arc::new(factory.clone()),
            PoolConfig::default(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_connection("a").await.unwrap().id() })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();

        assert_eq!(ids.len(), 1);
        assert_eq!(factory.opened(), 1);
    }

    #[tokio::test]
    async fn test_gates_do_not_outlive_their_callers() {
        let (manager, _, _) = setup(vec![server_a()]);

        for i in 0..500 {
            let report = manager.test_connection(&format!("bogus-{i}")).await;
            assert!(!report.success);
        }
        manager.get_connection("a").await.unwrap();
        manager.invalidate_connection("a").await;

        assert_eq!(manager.gate_count(), 0);
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_gate_survives_while_creation_is_in_flight() {
        let factory = MockTransportFactory::new().with_open_delay(Duration::from_millis(50));
        factory.serve(URL_A, lookup_server());
        let registry = Arc::new(MemoryRegistry::with_catalog(vec![server_a()], vec![]));
        let manager = Arc::new(ConnectionManager::new(
            registry,
            Arc::new(factory.clone()),
            PoolConfig::default(),
        ));

        let creating = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_connection("a").await.map(|c| c.id()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.gate_count(), 1);

        let waiting = manager.get_connection("a").await.unwrap();
        assert_eq!(creating.await.unwrap().unwrap(), waiting.id());
        assert_eq!(factory.opened(), 1);
        assert_eq!(manager.gate_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_gives_new_identity() {
        let (manager, factory, _) = setup(vec![server_a()]);

        let before = manager.get_connection("a").await.unwrap();
        manager.invalidate_connection("a").await;
        manager.invalidate_connection("a").await;
        assert_eq!(manager.connection_count().await, 0);
        assert_eq!(before.status(), ConnectionStatus::Disconnected);

        let after = manager.get_connection("a").await.unwrap();
        assert_ne!(before.id(), after.id());
        assert_eq!(factory.opened(), 2);
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_unknown_server() {
        let (manager, _, _) = setup(vec![]);
        let err = manager.get_connection("missing").await.unwrap_err();
        assert!(matches!(err, McpError::ServerNotFound(ref id) if id == "missing"));
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_rejects_unsupported_transport_and_empty_url() {
        let (manager, factory, _) = setup(vec![
            ToolServerDescriptor::new("s", "S", "stdio", "/usr/bin/tool"),
            ToolServerDescriptor::new("e", "E", "sse", ""),
        ]);

        assert!(matches!(
            manager.get_connection("s").await,
            Err(McpError::UnsupportedTransport(_))
        ));
        assert!(matches!(
            manager.get_connection("e").await,
            Err(McpError::Connection { ref message, .. }) if message == "URL is required"
        ));
        assert_eq!(factory.opened(), 0);
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_encrypted_descriptor_without_credentials() {
        let mut desc = server_a();
        desc.encrypted_url = true;
        let (manager, _, _) = setup(vec![desc]);

        assert!(matches!(
            manager.get_connection("a").await,
            Err(McpError::Credential(CredentialError::InvalidKey(_)))
        ));
    }

    #[tokio::test]
    async fn test_encrypted_url_is_decrypted() {
        let creds = credentials();
        let mut desc = server_a();
        desc.url = creds.encrypt(URL_A).unwrap();
        desc.encrypted_url = true;

        let factory = MockTransportFactory::new();
        factory.serve(URL_A, lookup_server());
        let registry = Arc::new(MemoryRegistry::with_catalog(vec![desc], vec![]));
        let manager = ConnectionManager::new(registry, Arc::new(factory.clone()), PoolConfig::default())
            .with_credentials(creds);

        manager.get_connection("a").await.unwrap();
        assert_eq!(factory.endpoints()[0].url, URL_A);
    }

    #[tokio::test]
    async fn test_undecryptable_url_is_treated_as_plaintext() {
        let mut desc = server_a();
        desc.encrypted_url = true;

        let factory = MockTransportFactory::new();
        factory.serve(URL_A, lookup_server());
        let registry = Arc::new(MemoryRegistry::with_catalog(vec![desc], vec![]));
        let manager = ConnectionManager::new(registry, Arc::new(factory.clone()), PoolConfig::default())
            .with_credentials(credentials());

        let conn = manager.get_connection("a").await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(factory.endpoints()[0].url, URL_A);
    }

    #[tokio::test]
    async fn test_sensitive_headers() {
        let creds = credentials();
        let sensitive = vec!["Authorization".to_string()];
        let plain = server_a()
            .with_header("Authorization", "Bearer s3cret")
            .with_header("X-Region", "eu");

        let mut sealed = plain.clone();
        sealed.id = "sealed".into();
        sealed.headers = encrypt_headers(creds.as_ref(), &plain.headers, &sensitive).unwrap();
        sealed.sensitive_headers = sensitive.clone();

        // Stored plaintext under a sensitive name fails decryption; stored values are kept
        let mut stale = plain.clone();
        stale.id = "stale".into();
        stale.sensitive_headers = sensitive;

        let factory = MockTransportFactory::new();
        factory.serve(URL_A, lookup_server());
        let registry = Arc::new(MemoryRegistry::with_catalog(vec![sealed, stale], vec![]));
        let manager = ConnectionManager::new(registry, Arc::new(factory.clone()), PoolConfig::default())
            .with_credentials(creds);

        manager.get_connection("sealed").await.unwrap();
        manager.get_connection("stale").await.unwrap();

        let endpoints = factory.endpoints();
        assert_eq!(endpoints[0].headers, plain.headers);
        assert_eq!(endpoints[1].headers, plain.headers);
    }

    #[tokio::test]
    async fn test_transport_failure_marks_error_and_reconnects() {
        let (manager, factory, _) = setup(vec![server_a()]);

        let conn = manager.get_connection("a").await.unwrap();
        let err = conn.call_tool("flaky", serde_json::json!({})).await.unwrap_err();
        assert!(err.is_transport_failure());
        assert_eq!(conn.status(), ConnectionStatus::Error);
        assert!(conn.last_error().unwrap().contains("connection reset"));

        let fresh = manager.get_connection("a").await.unwrap();
        assert_ne!(conn.id(), fresh.id());
        assert_eq!(factory.opened(), 2);
        // The broken one was closed when replaced
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_server_side_errors_keep_connection_healthy() {
        let (manager, _, _) = setup(vec![server_a()]);

        let conn = manager.get_connection("a").await.unwrap();
        let err = conn.call_tool("nonexistent", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_failed_handshake_is_not_pooled() {
        let factory = MockTransportFactory::new();
        factory.serve(URL_A, MockServer::refusing("401 Unauthorized"));
        let registry = Arc::new(MemoryRegistry::with_catalog(vec![server_a()], vec![]));
        let manager = ConnectionManager::new(registry, Arc::new(factory.clone()), PoolConfig::default());

        let err = manager.get_connection("a").await.unwrap_err();
        assert!(err.to_string().contains("401 Unauthorized"));
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_connection_test_reports_tools() {
        let (manager, factory, registry) = setup(vec![server_a()]);
        factory.serve("https://empty.example/mcp", MockServer::new());
        registry
            .upsert(ToolServerDescriptor::new("empty", "Empty", "http", "https://empty.example/mcp"))
            .await;

        let ok = manager.test_connection("a").await;
        assert!(ok.success);
        assert_eq!(ok.tools, vec!["lookup", "flaky"]);

        let empty = manager.test_connection("empty").await;
        assert!(!empty.success);
        assert_eq!(
            empty.error.as_deref(),
            Some("connection successful but no tools available")
        );

        let missing = manager.test_connection("nope").await;
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("server not found: nope"));
    }

    #[tokio::test]
    async fn test_test_connection_forces_reconnect() {
        let (manager, factory, _) = setup(vec![server_a()]);
        let before = manager.get_connection("a").await.unwrap();

        manager.test_connection("a").await;
        let after = manager.get_connection("a").await.unwrap();

        assert_ne!(before.id(), after.id());
        assert_eq!(factory.opened(), 2);
    }

    #[tokio::test]
    async fn test_list_server_tools() {
        let (manager, _, _) = setup(vec![server_a()]);
        assert_eq!(manager.list_server_tools("a").await.unwrap(), vec!["lookup", "flaky"]);
    }

    #[tokio::test]
    async fn test_descriptor_change_invalidates_only_when_needed() {
        let (manager, factory, registry) = setup(vec![server_a()]);
        let first = manager.get_connection("a").await.unwrap();

        let mut renamed = server_a();
        renamed.description = "Now with docs".into();
        let previous = registry.upsert(renamed.clone()).await.unwrap();
        manager.descriptor_changed(&previous, &renamed).await;
        assert!(Arc::ptr_eq(&first, &manager.get_connection("a").await.unwrap()));

        let mut slower = renamed.clone();
        slower.timeout_secs = 120;
        let previous = registry.upsert(slower.clone()).await.unwrap();
        manager.descriptor_changed(&previous, &slower).await;
        assert_eq!(manager.connection_count().await, 0);

        manager.get_connection("a").await.unwrap();
        assert_eq!(factory.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_stale() {
        let (manager, factory, registry) = setup(vec![server_a()]);
        factory.serve("https://b.example/mcp", lookup_server());
        registry
            .upsert(ToolServerDescriptor::new("b", "B", "http", "https://b.example/mcp"))
            .await;

        let idle = manager.get_connection("a").await.unwrap();
        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        let busy = manager.get_connection("b").await.unwrap();
        tokio::time::advance(Duration::from_secs(2 * 60)).await;

        assert_eq!(manager.evict_stale().await, 1);
        assert_eq!(idle.status(), ConnectionStatus::Disconnected);
        assert!(busy.is_connected());

        busy.mark_error("boom");
        assert_eq!(manager.evict_stale().await, 1);
        assert_eq!(manager.connection_count().await, 0);
        assert_eq!(factory.closed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_evicts_idle_connections() {
        let (manager, factory, _) = setup(vec![server_a()]);
        manager.get_connection("a").await.unwrap();

        let reaper = manager.spawn_reaper();
        for _ in 0..30 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            if manager.connection_count().await == 0 {
                break;
            }
        }

        assert_eq!(manager.connection_count().await, 0);
        assert_eq!(factory.closed(), 1);
        reaper.abort();
    }
}
