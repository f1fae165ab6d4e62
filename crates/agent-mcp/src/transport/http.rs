//! Streamable HTTP transport
//!
//! Each JSON-RPC message is POSTed to the server URL. Responses come back as
//! plain JSON or as a short event stream. The session ID handed out on
//! `initialize` is echoed on every later request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Endpoint, ToolTransport, find_response, sse_data_payloads};
use crate::error::{McpError, Result};
use crate::protocol::{RpcNotification, RpcRequest, RpcResponse};

const SESSION_HEADER: &str = "Mcp-Session-Id";

pub struct HttpTransport {
    client: reqwest::Client,
    server: String,
    url: String,
    headers: HeaderMap,
    timeout: Duration,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, endpoint: &Endpoint) -> Result<Self> {
        Ok(Self {
            client,
            server: endpoint.server_name.clone(),
            url: endpoint.url.clone(),
            headers: endpoint.header_map()?,
            timeout: endpoint.timeout,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn post<T: Serialize + Sync>(&self, body: &T) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .timeout(self.timeout)
            .json(body);
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| McpError::connection(&self.server, e))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::connection(
                &self.server,
                format!("HTTP {}: {}", status, body.trim()),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl ToolTransport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self.post(&RpcRequest::new(id, method, params)).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = response
            .text()
            .await
            .map_err(|e| McpError::connection(&self.server, e))?;

        let rpc = if is_stream {
            find_response(&sse_data_payloads(&body), id).ok_or_else(|| {
                McpError::Protocol(format!("no response to {} in event stream", method))
            })?
        } else {
            serde_json::from_str::<RpcResponse>(&body)
                .map_err(|e| McpError::Protocol(format!("invalid response to {}: {}", method, e)))?
        };

        debug!(server = %self.server, method, id, "Tool server responded");
        rpc.into_result()
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.post(&RpcNotification::new(method, params)).await?;
        Ok(())
    }

    async fn close(&self) {
        let Some(session) = self.session_id() else {
            return;
        };
        let result = self
            .client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .timeout(self.timeout)
            .send()
            .await;
        if let Err(e) = result {
            warn!(server = %self.server, error = %e, "Failed to end tool server session");
        }
    }
}
