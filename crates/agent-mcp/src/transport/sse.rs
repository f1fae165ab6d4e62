//! Legacy SSE transport
//!
//! A long-lived GET event stream carries responses. The server's first
//! `endpoint` event names the URL that requests are POSTed to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap};
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Event, EventSource};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Endpoint, ToolTransport};
use crate::error::{McpError, Result};
use crate::protocol::{RpcNotification, RpcRequest, RpcResponse};

/// Requests waiting for their response on the event stream, by JSON-RPC id
#[derive(Clone, Default)]
struct Pending(Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>);

impl Pending {
    fn entries(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<RpcResponse>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start waiting on `id`. The entry lives as long as the returned ticket.
    fn register(&self, id: u64) -> (Ticket, oneshot::Receiver<RpcResponse>) {
        let (tx, rx) = oneshot::channel();
        self.entries().insert(id, tx);
        (Ticket { pending: self.clone(), id }, rx)
    }

    /// Hand one `message` event to its waiter; false if nobody was waiting
    fn route(&self, data: &str, server: &str) -> bool {
        let response = match serde_json::from_str::<RpcResponse>(data) {
            Ok(r) => r,
            Err(e) => {
                warn!(server, error = %e, "Invalid JSON-RPC message on event stream");
                return false;
            }
        };
        // Server-initiated requests and notifications carry neither field
        if response.result.is_none() && response.error.is_none() {
            return false;
        }
        let waiter = response
            .id
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|id| self.entries().remove(&id));
        match waiter {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Dropping the senders wakes every waiter with an error
    fn clear(&self) {
        self.entries().clear();
    }
}

struct Ticket {
    pending: Pending,
    id: u64,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.pending.entries().remove(&self.id);
    }
}

pub struct SseTransport {
    client: reqwest::Client,
    server: String,
    post_url: Url,
    headers: HeaderMap,
    timeout: Duration,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the `endpoint` announcement
    pub async fn connect(client: reqwest::Client, endpoint: &Endpoint) -> Result<Self> {
        let server = endpoint.server_name.clone();
        let headers = endpoint.header_map()?;
        let base = Url::parse(&endpoint.url).map_err(|e| McpError::connection(&server, e))?;

        let request = client
            .get(base.clone())
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream");
        let mut source = EventSource::new(request).map_err(|e| McpError::connection(&server, e))?;
        source.set_retry_policy(Box::new(Never));

        let post_url =
            match tokio::time::timeout(endpoint.timeout, await_endpoint(&mut source, &base, &server)).await {
                Ok(Ok(url)) => url,
                Ok(Err(e)) => {
                    source.close();
                    return Err(e);
                }
                Err(_) => {
                    source.close();
                    return Err(McpError::connection(&server, "timed out waiting for endpoint event"));
                }
            };
        debug!(server = %server, endpoint = %post_url.path(), "SSE endpoint announced");

        let pending = Pending::default();
        let reader = tokio::spawn(read_events(source, pending.clone(), server.clone()));

        Ok(Self {
            client,
            server,
            post_url,
            headers,
            timeout: endpoint.timeout,
            pending,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    async fn post<T: Serialize + Sync>(&self, body: &T) -> Result<()> {
        let response = self
            .client
            .post(self.post_url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| McpError::connection(&self.server, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::connection(&self.server, format!("HTTP {}", status)));
        }
        Ok(())
    }
}

async fn await_endpoint(source: &mut EventSource, base: &Url, server: &str) -> Result<Url> {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Message(msg)) if msg.event == "endpoint" => {
                return base
                    .join(msg.data.trim())
                    .map_err(|e| McpError::Protocol(format!("bad endpoint event: {}", e)));
            }
            Ok(Event::Message(msg)) => {
                debug!(server, event = %msg.event, "Ignoring event before endpoint");
            }
            Ok(Event::Open) => {}
            Err(e) => return Err(McpError::connection(server, e)),
        }
    }
    Err(McpError::connection(server, "event stream closed before endpoint was announced"))
}

/// Route responses from the stream to whoever is waiting on their ID
async fn read_events(mut source: EventSource, pending: Pending, server: String) {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Message(msg)) if msg.event == "message" => {
                pending.route(&msg.data, &server);
            }
            Ok(_) => {}
            Err(reqwest_eventsource::Error::StreamEnded) => break,
            Err(e) => {
                warn!(server = %server, error = %e, "Tool server event stream failed");
                break;
            }
        }
    }

    source.close();
    pending.clear();
}

#[async_trait]
impl ToolTransport for SseTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (_ticket, rx) = self.pending.register(id);

        self.post(&RpcRequest::new(id, method, params)).await?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(McpError::connection(&self.server, "event stream closed")),
            Err(_) => Err(McpError::connection(
                &self.server,
                format!("timed out waiting for {} response", method),
            )),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.post(&RpcNotification::new(method, params)).await
    }

    async fn close(&self) {
        self.reader.abort();
        self.pending.clear();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
