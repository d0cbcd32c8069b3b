//! tata-engine: Conversation state for the TATA assistant event stream
//!
//! This crate turns decoded stream events into display state:
//! - Per-turn duplicate filtering and tool-call tracking
//! - Thinking-step classification behind a replaceable trait
//! - Agenda checklist parsing
//! - A [`ChatSession`] that drives one turn at a time over a [`Transport`]

pub mod agenda;
pub mod classify;
pub mod config;
pub mod conversation;
pub mod dedup;
pub mod error;
pub mod events;
pub mod handle;
pub mod reducer;
pub mod registry;
pub mod session;
pub mod transport;

pub use agenda::{AgendaSummary, AgendaTask, TaskStatus, TasksByStatus, parse_agenda};
pub use classify::{KeywordClassifier, Surfaced, ThinkingClassifier};
pub use config::EngineConfig;
pub use conversation::{
    Conversation, ConversationMessage, Diagnostic, DiagnosticLevel, Role, StepLabel, ThinkingStep,
    ToolCallRecord, ToolStatus,
};
pub use dedup::DuplicateFilter;
pub use error::{Error, Result};
pub use events::SessionUpdate;
pub use handle::SessionHandle;
pub use reducer::{Change, Outcome, Reducer, TurnEnd, TurnState};
pub use registry::{ResolveError, ToolCallRegistry};
pub use session::{ChatSession, new_session_id};
pub use transport::{ByteStream, ReplayTransport, Transport};

// Re-export the wire types callers need alongside the engine
pub use tata_wire::{ChatRequest, EventKind, StreamEvent};
