//! Conversation state: messages, thinking steps, tool calls, agenda, diagnostics.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tata_wire::EventKind;

use crate::agenda::AgendaSummary;

/// Who a message is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Error,
    ToolResult,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Error => "error",
            Role::ToolResult => "tool_result",
        }
    }
}

/// Display label of a surfaced thinking step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLabel {
    /// The agent picked a tool
    ToolSelection,
    /// The agent announced a tool invocation
    ToolInvocation,
    /// A tool call event was received
    ExecutingTool,
    /// The agent reported a tool finished
    ExecutionComplete,
    /// Any other narration
    Analysis,
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepLabel::ToolSelection => "tool selection",
            StepLabel::ToolInvocation => "tool invocation",
            StepLabel::ExecutingTool => "executing tool",
            StepLabel::ExecutionComplete => "execution complete",
            StepLabel::Analysis => "analysis",
        })
    }
}

/// A surfaced fragment of the agent's reasoning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub content: String,
    /// Kind of the event this step came from
    pub kind: EventKind,
    pub timestamp: f64,
    pub label: StepLabel,
}

/// Lifecycle state of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Calling,
    Completed,
    Error,
}

impl ToolStatus {
    /// Parse the wire spelling
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "calling" => Some(ToolStatus::Calling),
            "completed" => Some(ToolStatus::Completed),
            "error" => Some(ToolStatus::Error),
            _ => None,
        }
    }

    /// Whether the call has been resolved
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ToolStatus::Calling)
    }
}

/// One tool invocation, tracked from call to result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Call identifier, unique within a turn
    pub id: String,
    pub tool_name: String,
    pub display_name: String,
    pub status: ToolStatus,
    pub called_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<f64>,
}

impl ToolCallRecord {
    /// Create a record in the `calling` state
    pub fn calling(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        display_name: impl Into<String>,
        called_at: f64,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            display_name: display_name.into(),
            status: ToolStatus::Calling,
            called_at,
            result: None,
            resolved_at: None,
        }
    }

    /// Move out of `calling`. Returns false if the record was already resolved.
    pub fn resolve(&mut self, status: ToolStatus, result: impl Into<String>, at: f64) -> bool {
        if self.status.is_resolved() || !status.is_resolved() {
            return false;
        }
        self.status = status;
        self.result = Some(result.into());
        self.resolved_at = Some(at);
        true
    }
}

/// A message bubble in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: f64,
    /// True while the owning turn is still receiving events
    pub is_streaming: bool,
    #[serde(default)]
    pub thinking_steps: Vec<ThinkingStep>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Content is markdown rather than plain text
    #[serde(default)]
    pub is_rich_text: bool,
}

impl ConversationMessage {
    fn new(id: impl Into<String>, role: Role, content: impl Into<String>, created_at: f64) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            created_at,
            is_streaming: false,
            thinking_steps: vec![],
            tool_calls: vec![],
            is_rich_text: false,
        }
    }

    /// Create a user message
    pub fn user(id: impl Into<String>, text: impl Into<String>, created_at: f64) -> Self {
        Self::new(id, Role::User, text, created_at)
    }

    /// Create the empty, streaming assistant message a turn writes into
    pub fn streaming_assistant(id: impl Into<String>, created_at: f64) -> Self {
        Self {
            is_streaming: true,
            ..Self::new(id, Role::Assistant, "", created_at)
        }
    }

    /// Create a finished assistant reply
    pub fn assistant(id: impl Into<String>, content: impl Into<String>, created_at: f64) -> Self {
        Self {
            is_rich_text: true,
            ..Self::new(id, Role::Assistant, content, created_at)
        }
    }

    /// Create a standalone tool output message
    pub fn tool_result(
        id: impl Into<String>,
        content: impl Into<String>,
        record: ToolCallRecord,
        created_at: f64,
    ) -> Self {
        Self {
            is_rich_text: true,
            tool_calls: vec![record],
            ..Self::new(id, Role::ToolResult, content, created_at)
        }
    }
}

/// Severity of a diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Info,
    Warn,
}

/// A trace entry for the render layer's debug view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub timestamp: f64,
    pub level: DiagnosticLevel,
    /// Kind of the event that produced the entry, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    pub message: String,
}

/// Everything the render layer displays for one session
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    /// Session identifier sent with every request
    pub session_id: String,
    /// Ordered message list
    pub messages: Vec<ConversationMessage>,
    /// Most recent agenda, if any terminal event carried one
    pub agenda: Option<AgendaSummary>,
    /// Whether a turn is being processed
    pub is_processing: bool,
    /// Number of turns started in this session
    pub turns: u32,
    diagnostics: VecDeque<Diagnostic>,
    #[serde(skip)]
    max_diagnostics: usize,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new(session_id: impl Into<String>, max_diagnostics: usize) -> Self {
        Self {
            session_id: session_id.into(),
            messages: vec![],
            agenda: None,
            is_processing: false,
            turns: 0,
            diagnostics: VecDeque::new(),
            max_diagnostics: max_diagnostics.max(1),
        }
    }

    /// Find a message by id
    pub fn message(&self, id: &str) -> Option<&ConversationMessage> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    /// Find a message by id, mutably
    pub fn message_mut(&mut self, id: &str) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    /// Whether a message with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.message(id).is_some()
    }

    /// Diagnostic trace, oldest first
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Number of diagnostics currently kept
    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// Append a diagnostic, dropping the oldest once the cap is reached
    pub fn record(
        &mut self,
        level: DiagnosticLevel,
        kind: Option<EventKind>,
        timestamp: f64,
        message: impl Into<String>,
    ) {
        if self.diagnostics.len() >= self.max_diagnostics {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(Diagnostic {
            timestamp,
            level,
            kind,
            message: message.into(),
        });
    }
}
