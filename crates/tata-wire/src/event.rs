//! Stream event types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Kind of a stream event, as named on the wire.
///
/// Kinds this crate doesn't know about are kept verbatim in [`EventKind::Unknown`]
/// so they can still be forwarded for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Transport connection acknowledged
    Connection,
    /// Agent started processing the turn
    Start,
    /// Intermediate reasoning
    Thinking,
    /// Narration from the agent between tool calls
    AssistantMessage,
    /// A tool invocation started
    ToolCall,
    /// A tool invocation produced its output
    ToolResult,
    /// A draft document changed
    DraftUpdate,
    /// A ready-made agenda summary
    AgendaUpdate,
    /// Terminal reply for the turn
    Final,
    /// Terminal reply that waits for user input
    InteractivePause,
    /// Agent-reported failure
    Error,
    /// Keep-alive
    Heartbeat,
    /// Anything else
    Unknown(String),
}

impl EventKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Connection => "connection",
            EventKind::Start => "start",
            EventKind::Thinking => "thinking",
            EventKind::AssistantMessage => "assistant_message",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::DraftUpdate => "draft_update",
            EventKind::AgendaUpdate => "agenda_update",
            EventKind::Final => "final",
            EventKind::InteractivePause => "interactive_pause",
            EventKind::Error => "error",
            EventKind::Heartbeat => "heartbeat",
            EventKind::Unknown(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "connection" => EventKind::Connection,
            "start" => EventKind::Start,
            "thinking" => EventKind::Thinking,
            "assistant_message" => EventKind::AssistantMessage,
            "tool_call" => EventKind::ToolCall,
            "tool_result" => EventKind::ToolResult,
            "draft_update" => EventKind::DraftUpdate,
            "agenda_update" => EventKind::AgendaUpdate,
            "final" => EventKind::Final,
            "interactive_pause" => EventKind::InteractivePause,
            "error" => EventKind::Error,
            "heartbeat" => EventKind::Heartbeat,
            _ => EventKind::Unknown(value),
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        EventKind::from(value.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open key/value metadata attached to an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(serde_json::Map<String, serde_json::Value>);

impl Metadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a raw value
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Get a non-empty string value.
    ///
    /// Empty strings are treated as absent; producers send `""` for fields they don't fill.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// First key from `keys` that holds a non-null, non-empty value, with that value.
    pub fn first_present<'a, K: AsRef<str>>(
        &'a self,
        keys: &'a [K],
    ) -> Option<(&'a str, &'a serde_json::Value)> {
        keys.iter().find_map(|key| {
            let key: &str = key.as_ref();
            let value = self.0.get(key)?;
            let present = match value {
                serde_json::Value::Null => false,
                serde_json::Value::String(s) => !s.is_empty(),
                _ => true,
            };
            present.then_some((key, value))
        })
    }

    /// Insert a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Keys present
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether no metadata was sent
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One decoded unit of the stream protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event kind (`type` on the wire)
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Text payload
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// Producer timestamp; integers and fractional seconds are both accepted
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: f64,
    /// Kind-specific fields
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
}

impl StreamEvent {
    /// Create an event without metadata
    pub fn new(kind: impl Into<EventKind>, content: impl Into<String>, timestamp: f64) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
            timestamp,
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata field
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// First `max_chars` characters of the content
    pub fn content_prefix(&self, max_chars: usize) -> &str {
        match self.content.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.content[..idx],
            None => &self.content,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of the streaming chat request sent upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Outgoing user message
    pub message: String,
    /// Conversation identifier grouping turns
    pub session_id: String,
    /// Account the request is made for
    pub user_id: String,
    /// Always true; the engine only consumes streamed responses
    pub stream: bool,
}

impl ChatRequest {
    /// Default account used when none is configured
    pub const DEFAULT_USER_ID: &'static str = "user_main";

    /// Create a streaming request
    pub fn new(
        message: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            stream: true,
        }
    }
}
