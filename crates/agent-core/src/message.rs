//! Conversation Messages
//!
//! Message format exchanged between the agentic loop and model providers.

use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Call this tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name, for tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool result message
    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(name.into());
        msg
    }

    /// Whether the assistant asked for tools in this message
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A message from earlier in the chat, supplied by the caller
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

/// Ordered, append-only message sequence for one inference turn
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the model input from a system prompt, prior context and the new
    /// user message.
    ///
    /// Tool-role context entries are display-only and skipped. Any context
    /// role other than `assistant` is sent as `user`.
    pub fn from_context(system_prompt: &str, context: &[ContextMessage], user_message: &str) -> Self {
        let mut conv = Self::new();

        if !system_prompt.is_empty() {
            conv.push(Message::system(system_prompt));
        }

        for msg in context {
            match msg.role {
                Role::Tool => continue,
                Role::Assistant => conv.push(Message::assistant(&msg.content)),
                _ => conv.push(Message::user(&msg.content)),
            }
        }

        conv.push(Message::user(user_message));
        conv
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Add several messages in order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
