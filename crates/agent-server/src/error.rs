//! API Errors

use agent_core::AgentError;
use agent_mcp::McpError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    ToolServer(#[from] McpError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::AgentNotFound(_) => (StatusCode::NOT_FOUND, "AGENT_NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Agent(AgentError::ProviderUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE")
            }
            ApiError::Agent(_) => (StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR"),
            ApiError::ToolServer(McpError::ServerNotFound(_)) => (StatusCode::NOT_FOUND, "SERVER_NOT_FOUND"),
            ApiError::ToolServer(_) => (StatusCode::BAD_GATEWAY, "TOOL_SERVER_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let error = match &self {
            ApiError::Agent(e) => e.user_message(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        }

        (status, Json(ErrorResponse { error, code: code.into() })).into_response()
    }
}
