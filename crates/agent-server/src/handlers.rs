//! HTTP/SSE Handlers

use std::convert::Infallible;

use agent_core::{
    EventSink, InferenceRequest, Result as AgentResult, StreamEvent, ToolCallEvent,
};
use agent_mcp::ConnectionTest;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

/// Tool results longer than this are cut in streamed events
const MAX_STREAMED_RESULT_CHARS: usize = 2000;

const STREAM_BUFFER: usize = 64;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: usize,
    pub agents: usize,
    pub providers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub tool_events: Vec<ToolCallEvent>,
}

#[derive(Debug, Serialize)]
pub struct ServerToolsResponse {
    pub server_id: String,
    pub tools: Vec<String>,
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/agents/{agent_id}/chat", post(chat_handler))
        .route("/api/agents/{agent_id}/chat/stream", post(chat_stream_handler))
        .route("/api/servers/{server_id}/test", post(test_server))
        .route("/api/servers/{server_id}/tools", get(server_tools))
        .route("/api/servers/{server_id}/connection", delete(invalidate_connection))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.manager.connection_count().await,
        agents: state.agents.len(),
        providers: state.providers.names().into_iter().map(String::from).collect(),
    })
}

fn validate(request: &InferenceRequest) -> Result<(), ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message is required".into()));
    }
    Ok(())
}

/// Run the loop to completion and return the answer with its tool events
pub async fn chat_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(request): Json<InferenceRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    validate(&request)?;
    let (profile, agent) = state.agent(&agent_id)?;

    let reply = agent.respond(&profile, &request).await?;

    Ok(Json(ChatResponse {
        response: reply.content,
        tool_events: reply.tool_events,
    }))
}

/// Stream loop events as server-sent events
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(request): Json<InferenceRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    validate(&request)?;
    let (profile, agent) = state.agent(&agent_id)?;

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        let sink = DisplaySink { tx };
        if let Err(e) = agent.stream(&profile, &request, &sink).await {
            debug!(agent = %profile.id, error = %e, "Stream ended with error");
        }
    });

    let events = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(to_sse(&event)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_else(|e| {
        format!(r#"{{"type":"error","data":{{"message":"unserializable event: {e}"}}}}"#)
    }))
}

/// Forwards events to the response stream with long tool results cut short
struct DisplaySink {
    tx: mpsc::Sender<StreamEvent>,
}

#[async_trait]
impl EventSink for DisplaySink {
    async fn emit(&self, event: StreamEvent) -> AgentResult<()> {
        let event = match event {
            StreamEvent::ToolEvent(tool_event) => {
                StreamEvent::ToolEvent(tool_event.truncated(MAX_STREAMED_RESULT_CHARS))
            }
            other => other,
        };
        self.tx.emit(event).await
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Force a fresh connection and report what the server offers
pub async fn test_server(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Json<ConnectionTest> {
    Json(state.manager.test_connection(&server_id).await)
}

pub async fn server_tools(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Result<Json<ServerToolsResponse>, ApiError> {
    let tools = state.manager.list_server_tools(&server_id).await?;
    Ok(Json(ServerToolsResponse { server_id, tools }))
}

/// Drop the pooled connection; the next use reconnects
pub async fn invalidate_connection(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> StatusCode {
    state.manager.invalidate_connection(&server_id).await;
    info!(server = %server_id, "Connection invalidated on request");
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use agent_core::{
        Completion, GenerationOptions, LlmProvider, Message, ToolCall, ToolSchema,
        provider::{ModelInfo, ProviderInfo},
    };
    use agent_mcp::transport::{MockReply, MockServer};
    use agent_mcp::MockTransportFactory;
    use agent_runtime::ProviderRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Catalog, Settings};

    const CATALOG: &str = r#"
        [[servers]]
        id = "a"
        name = "A"
        type = "http"
        url = "https://a.example/mcp"

        [[agents]]
        id = "helper"
        name = "Helper"
        provider = "scripted"
        model = "test-model"

        [[agents]]
        id = "ghost"
        name = "Ghost"
        provider = "mistral"
        model = "m"

        [[bindings]]
        agent_id = "helper"
        server_id = "a"
    "#;

    struct ScriptedProvider {
        script: Mutex<VecDeque<Completion>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "scripted".into(),
                supports_tools: true,
            }
        }

        async fn health_check(&self) -> AgentResult<bool> {
            Ok(true)
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _options: &GenerationOptions,
            _tools: &[ToolSchema],
        ) -> AgentResult<Completion> {
            let next = self.script.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| Completion::text("done")))
        }

        async fn list_models(&self) -> AgentResult<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    fn app(lookup_reply: &str, script: Vec<Completion>) -> (Router, AppState) {
        let factory = MockTransportFactory::new();
        factory.serve(
            "https://a.example/mcp",
            MockServer::new().tool("lookup", "Look things up", MockReply::Text(lookup_reply.into())),
        );

        let mut providers = ProviderRegistry::new();
        providers.register(
            "scripted",
            Arc::new(ScriptedProvider {
                script: Mutex::new(script.into()),
            }),
        );

        let mut state = AppState::new(
            Catalog::parse(CATALOG).unwrap(),
            &Settings::default(),
            Arc::new(factory),
            None,
            providers,
        );
        state.agent_config.stream_delay = Duration::ZERO;
        (router(state.clone()), state)
    }

    fn lookup_then_answer() -> Vec<Completion> {
        vec![
            Completion::tool_calls("", vec![ToolCall::new("call_1", "A_lookup", r#"{"input":"x"}"#)]),
            Completion::text("The answer is 42."),
        ]
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app("42", Vec::new());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["agents"], 2);
    }

    #[tokio::test]
    async fn test_chat_runs_tool_loop() {
        let (app, state) = app("42", lookup_then_answer());
        let response = app
            .oneshot(post_json("/api/agents/helper/chat", json!({"message": "what is x?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["response"], "The answer is 42.");

        let events = body["tool_events"].as_array().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["type"], "tool_start");
        assert_eq!(events[1]["type"], "tool_result");
        assert_eq!(events[1]["result"], "42");
        assert_eq!(events[2]["type"], "tool_batch_complete");

        assert_eq!(state.manager.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_404() {
        let (app, _) = app("42", Vec::new());
        let response = app
            .oneshot(post_json("/api/agents/nobody/chat", json!({"message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "AGENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_provider_is_400() {
        let (app, _) = app("42", Vec::new());
        let response = app
            .oneshot(post_json("/api/agents/ghost/chat", json!({"message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "unsupported provider: mistral");
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (app, _) = app("42", Vec::new());
        let response = app
            .oneshot(post_json("/api/agents/helper/chat", json!({"message": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_truncates_long_tool_results() {
        let long = "x".repeat(3000);
        let (app, _) = app(&long, lookup_then_answer());
        let response = app
            .oneshot(post_json("/api/agents/helper/chat/stream", json!({"message": "what is x?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let events: Vec<Value> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();

        assert_eq!(events.first().unwrap()["type"], "metadata");
        assert_eq!(events.first().unwrap()["data"]["tools"], json!(["A_lookup"]));

        let result = events
            .iter()
            .find(|e| e["type"] == "tool_event" && e["data"]["type"] == "tool_result")
            .unwrap();
        let text = result["data"]["result"].as_str().unwrap();
        assert!(text.ends_with("... [truncated for streaming]"));
        assert_eq!(text.chars().filter(|&c| c == 'x').count(), 2000);

        let last = events.last().unwrap();
        assert_eq!(last["type"], "done");
        assert_eq!(last["data"]["content"], "The answer is 42.");
    }

    #[tokio::test]
    async fn test_display_sink_sees_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        let sink = DisplaySink { tx };
        drop(rx);

        tokio::time::timeout(Duration::from_secs(1), sink.closed())
            .await
            .unwrap();
        assert!(sink.emit(StreamEvent::Token("x".into())).await.is_err());
    }

    #[tokio::test]
    async fn test_server_diagnostics() {
        let (app, state) = app("42", Vec::new());

        let response = app
            .clone()
            .oneshot(Request::get("/api/servers/a/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["tools"], json!(["lookup"]));

        let response = app
            .clone()
            .oneshot(Request::post("/api/servers/a/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["tools"], json!(["lookup"]));

        let response = app
            .clone()
            .oneshot(Request::delete("/api/servers/a/connection").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.manager.connection_count().await, 0);

        let response = app
            .oneshot(Request::get("/api/servers/zzz/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "SERVER_NOT_FOUND");
    }
}
