//! agent-server
//!
//! Axum host for catalog-defined agents. Each agent answers through the
//! agentic tool-call loop, with tools drawn from its bound MCP servers
//! over a shared, self-reaping connection pool.

mod config;
mod error;
mod handlers;
mod state;

use std::sync::Arc;

use agent_mcp::{AesGcmCredentials, CredentialService, McpTransportFactory};
use agent_runtime::ProviderRegistry;
use anyhow::Context;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Catalog, Settings};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let catalog = Catalog::load(&settings.catalog_path)?;

    let credentials = match settings.encryption_key.as_deref() {
        Some(key) => {
            let service = AesGcmCredentials::from_passphrase(key)
                .context("invalid ENCRYPTION_KEY")?;
            Some(Arc::new(service) as Arc<dyn CredentialService>)
        }
        None => {
            if catalog.servers.iter().any(|s| s.needs_decryption()) {
                tracing::warn!("Catalog has encrypted servers but ENCRYPTION_KEY is not set; they will fail to connect");
            }
            None
        }
    };

    let providers = ProviderRegistry::from_env()?;
    for name in providers.names() {
        if let Ok(provider) = providers.get(name) {
            match provider.health_check().await {
                Ok(true) => tracing::info!(provider = name, "Provider reachable"),
                _ => tracing::warn!(provider = name, "Provider not reachable, requests will fail"),
            }
        }
    }
    for agent in &catalog.agents {
        if providers.get(&agent.provider).is_err() {
            tracing::warn!(agent = %agent.id, provider = %agent.provider, "Agent uses an unconfigured provider");
        }
    }

    let state = AppState::new(
        catalog,
        &settings,
        Arc::new(McpTransportFactory::new()),
        credentials,
        providers,
    );
    let reaper = state.manager.spawn_reaper();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("agent-server listening on http://{}", settings.bind_addr);
    tracing::info!("  GET    /health");
    tracing::info!("  POST   /api/agents/{{agent_id}}/chat");
    tracing::info!("  POST   /api/agents/{{agent_id}}/chat/stream");
    tracing::info!("  POST   /api/servers/{{server_id}}/test");
    tracing::info!("  GET    /api/servers/{{server_id}}/tools");
    tracing::info!("  DELETE /api/servers/{{server_id}}/connection");

    axum::serve(listener, app).await?;

    reaper.abort();
    Ok(())
}
