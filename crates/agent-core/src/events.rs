//! Stream Events
//!
//! What the agentic loop tells its caller while it runs: a metadata event,
//! text tokens, tool lifecycle events, then exactly one `done` or `error`.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{AgentError, Result};

/// Tool lifecycle stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventKind {
    ToolStart,
    ToolResult,
    ToolError,
    ToolBatchComplete,
}

/// Observability record for one tool call (or a finished batch)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    #[serde(rename = "type")]
    pub kind: ToolEventKind,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub call_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,

    /// Parsed arguments; only on `tool_start`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolCallEvent {
    fn new(kind: ToolEventKind, call_id: &str, tool_name: &str) -> Self {
        Self {
            kind,
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments: None,
            result: None,
            error: None,
            duration_ms: None,
        }
    }

    /// A call is about to run. Arguments that are not valid JSON are dropped.
    pub fn start(call_id: &str, tool_name: &str, raw_arguments: &str) -> Self {
        let mut event = Self::new(ToolEventKind::ToolStart, call_id, tool_name);
        event.arguments = serde_json::from_str(raw_arguments).ok();
        event
    }

    pub fn result(call_id: &str, tool_name: &str, result: impl Into<String>, duration_ms: u64) -> Self {
        let mut event = Self::new(ToolEventKind::ToolResult, call_id, tool_name);
        event.result = Some(result.into());
        event.duration_ms = Some(duration_ms);
        event
    }

    pub fn error(call_id: &str, tool_name: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        let mut event = Self::new(ToolEventKind::ToolError, call_id, tool_name);
        event.error = Some(error.into());
        event.duration_ms = Some(duration_ms);
        event
    }

    pub fn batch_complete() -> Self {
        Self::new(ToolEventKind::ToolBatchComplete, "", "")
    }

    /// Copy with the result cut to `max_chars` characters, for display streams
    pub fn truncated(&self, max_chars: usize) -> Self {
        let mut event = self.clone();
        if let Some(result) = &self.result {
            if result.chars().count() > max_chars {
                let mut cut: String = result.chars().take(max_chars).collect();
                cut.push_str("... [truncated for streaming]");
                event.result = Some(cut);
            }
        }
        event
    }
}

/// Everything the caller receives, in order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Metadata {
        request_id: String,
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        model: String,
        tools: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_errors: Vec<String>,
        started_at: DateTime<Utc>,
    },
    Token(String),
    ToolEvent(ToolCallEvent),
    Done {
        content: String,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    /// `done` and `error` end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// Push-style destination for stream events.
///
/// An `Err` from [`EventSink::emit`] means the caller has gone away and the
/// loop should stop.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: StreamEvent) -> Result<()>;

    /// Resolves once the caller has gone away. Sinks without a caller to
    /// lose never resolve.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

#[async_trait]
impl EventSink for mpsc::Sender<StreamEvent> {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        self.send(event).await.map_err(|_| AgentError::Cancelled)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Mutex<Vec<StreamEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the tool lifecycle events
    pub fn tool_events(&self) -> Vec<ToolCallEvent> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::ToolEvent(tool_event) => Some(tool_event),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for EventBuffer {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_event_wire_shape() {
        let event = ToolCallEvent::start("call_1", "A_lookup", r#"{"q":"x"}"#);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_start");
        assert_eq!(json["call_id"], "call_1");
        assert_eq!(json["arguments"]["q"], "x");
        assert!(json.get("duration_ms").is_none());

        let batch = serde_json::to_value(ToolCallEvent::batch_complete()).unwrap();
        assert_eq!(batch, serde_json::json!({"type": "tool_batch_complete"}));
    }

    #[test]
    fn test_stream_event_wire_shape() {
        let token = serde_json::to_value(StreamEvent::Token("h".into())).unwrap();
        assert_eq!(token, serde_json::json!({"type": "token", "data": "h"}));

        let done = serde_json::to_value(StreamEvent::Done { content: "hi".into() }).unwrap();
        assert_eq!(done["data"]["content"], "hi");
        assert!(StreamEvent::Done { content: String::new() }.is_terminal());
    }

    #[test]
    fn test_truncation_is_char_safe() {
        let event = ToolCallEvent::result("c", "t", "é".repeat(10), 5);
        let cut = event.truncated(4);
        assert_eq!(cut.result.as_deref(), Some("éééé... [truncated for streaming]"));

        let short = ToolCallEvent::result("c", "t", "ok", 5).truncated(4);
        assert_eq!(short.result.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_closed_channel_reports_cancellation() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = tx.emit(StreamEvent::Token("x".into())).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_channel_sink_resolves_closed_on_drop() {
        let (tx, rx) = mpsc::channel::<StreamEvent>(1);
        let waiter = tokio::spawn(async move { EventSink::closed(&tx).await });
        drop(rx);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
