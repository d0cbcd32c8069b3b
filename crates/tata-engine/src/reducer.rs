//! Session state reducer: applies decoded events to a conversation.
//!
//! Every mutation of a turn's state goes through [`Reducer::apply`]. Per-turn
//! scratch state (duplicate filter, tool-call registry, accumulated thinking
//! steps) lives in a [`TurnState`] created by [`Reducer::begin_turn`] and dropped
//! when the turn's stream is done, so nothing leaks from one turn to the next.

use serde::Serialize;
use std::sync::Arc;
use tata_wire::{EventKind, StreamEvent};

use crate::{
    agenda::{AgendaSummary, parse_agenda},
    classify::{KeywordClassifier, ThinkingClassifier},
    config::EngineConfig,
    conversation::{
        Conversation, ConversationMessage, DiagnosticLevel, Role, StepLabel, ThinkingStep,
        ToolCallRecord, ToolStatus,
    },
    dedup::DuplicateFilter,
    error::{Error, Result},
    registry::{ResolveError, ToolCallRegistry},
};

/// Metadata value marking a `final` event that repeats an interactive pause
const PAUSE_DISCRIMINATOR: &str = "interactive_pause";

/// `message_type` of assistant notes that are never shown
const TOOL_SUMMARY: &str = "tool_summary";

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEnd {
    /// The agent is waiting for user input
    Paused,
    /// The agent sent its final reply
    Completed,
    /// The agent reported an error, or the transport failed
    Failed,
    /// The stream ended without a terminal event
    Drained,
    /// The caller aborted the turn
    Aborted,
}

/// A state change produced by applying one event
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// An existing message was modified
    MessageUpdated(String),
    /// A new message was appended
    MessageAppended(String),
    /// The current agenda was replaced
    AgendaUpdated,
    /// The turn ended
    TurnEnded(TurnEnd),
}

/// Result of offering an event to the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The event was already applied in this turn
    Duplicate,
    /// The event was admitted; the list may be empty for diagnostic-only events
    Applied(Vec<Change>),
}

impl Outcome {
    /// Changes made, empty for duplicates
    pub fn changes(&self) -> &[Change] {
        match self {
            Outcome::Duplicate => &[],
            Outcome::Applied(changes) => changes,
        }
    }
}

/// Scratch state owned by one turn
#[derive(Debug)]
pub struct TurnState {
    message_id: String,
    filter: DuplicateFilter,
    tool_calls: ToolCallRegistry,
    thinking: Vec<ThinkingStep>,
    ended: Option<TurnEnd>,
}

impl TurnState {
    fn new(message_id: String, prefix_chars: usize) -> Self {
        Self {
            message_id,
            filter: DuplicateFilter::new(prefix_chars),
            tool_calls: ToolCallRegistry::new(),
            thinking: Vec::new(),
            ended: None,
        }
    }

    /// Id of the assistant message this turn streams into
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Tool calls registered so far
    pub fn tool_calls(&self) -> &ToolCallRegistry {
        &self.tool_calls
    }

    /// How the turn ended, if it has
    pub fn ended(&self) -> Option<TurnEnd> {
        self.ended
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_some()
    }
}

/// Normalise a final reply: blank lines dropped, paragraphs separated, indentation kept
fn normalize_reply(content: &str) -> String {
    content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim_start().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Applies stream events to conversation state
pub struct Reducer {
    classifier: Arc<dyn ThinkingClassifier>,
    config: EngineConfig,
}

impl Reducer {
    /// Create a reducer with the default keyword classifier
    pub fn new(config: EngineConfig) -> Self {
        Self::with_classifier(config, Arc::new(KeywordClassifier::default()))
    }

    /// Create a reducer with a custom thinking classifier
    pub fn with_classifier(config: EngineConfig, classifier: Arc<dyn ThinkingClassifier>) -> Self {
        Self { classifier, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a turn: append the user message and the streaming assistant placeholder.
    ///
    /// Fails if a turn is already processing or the message is blank.
    pub fn begin_turn(&self, conv: &mut Conversation, text: &str, now: f64) -> Result<TurnState> {
        if conv.is_processing {
            return Err(Error::TurnInProgress);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        conv.turns += 1;
        let user_id = format!("user_{}", conv.turns);
        let message_id = format!("ai_{}", conv.turns);

        conv.messages
            .push(ConversationMessage::user(user_id, text, now));
        conv.messages
            .push(ConversationMessage::streaming_assistant(message_id.clone(), now));
        conv.is_processing = true;
        conv.record(
            DiagnosticLevel::Info,
            None,
            now,
            format!("turn {} started", conv.turns),
        );
        tracing::info!("Turn {} started ({})", conv.turns, message_id);

        Ok(TurnState::new(message_id, self.config.fingerprint_prefix_chars))
    }

    /// Apply one decoded event to the turn's state
    pub fn apply(&self, conv: &mut Conversation, turn: &mut TurnState, event: &StreamEvent) -> Outcome {
        if !turn.filter.admit(event) {
            tracing::debug!("Skipping duplicate {} event", event.kind);
            conv.record(
                DiagnosticLevel::Info,
                Some(event.kind.clone()),
                event.timestamp,
                format!("duplicate {} skipped", event.kind),
            );
            return Outcome::Duplicate;
        }

        conv.record(
            DiagnosticLevel::Info,
            Some(event.kind.clone()),
            event.timestamp,
            format!("{}: {}", event.kind, event.content_prefix(self.config.preview_chars)),
        );

        if turn.is_ended() {
            conv.record(
                DiagnosticLevel::Warn,
                Some(event.kind.clone()),
                event.timestamp,
                format!("{} received after the turn ended; ignored", event.kind),
            );
            return Outcome::Applied(vec![]);
        }

        let changes = match &event.kind {
            EventKind::Connection | EventKind::Start | EventKind::Heartbeat => vec![],
            EventKind::Thinking => self.on_thinking(conv, turn, event),
            EventKind::AssistantMessage => self.on_note(conv, turn, event),
            EventKind::ToolCall => self.on_tool_call(conv, turn, event),
            EventKind::ToolResult => self.on_tool_result(conv, turn, event),
            EventKind::InteractivePause => self.on_pause(conv, turn, event),
            EventKind::Final => self.on_final(conv, turn, event),
            EventKind::DraftUpdate => {
                self.on_draft(conv, event);
                vec![]
            }
            EventKind::AgendaUpdate => self.on_agenda_update(conv, event),
            EventKind::Error => self.on_error(conv, turn, event),
            EventKind::Unknown(name) => {
                tracing::debug!("Unhandled event kind: {}", name);
                conv.record(
                    DiagnosticLevel::Warn,
                    Some(event.kind.clone()),
                    event.timestamp,
                    format!("unknown event kind: {}", name),
                );
                vec![]
            }
        };

        Outcome::Applied(changes)
    }

    /// Note a record the decoder rejected
    pub fn record_malformed(&self, conv: &mut Conversation, error: &tata_wire::Error, now: f64) {
        conv.record(
            DiagnosticLevel::Warn,
            None,
            now,
            format!("malformed record skipped: {}", error),
        );
    }

    /// The stream ended. Finalises the active message if no terminal event did.
    pub fn finish_stream(&self, conv: &mut Conversation, turn: &mut TurnState, now: f64) -> Vec<Change> {
        if turn.is_ended() {
            return vec![];
        }
        tracing::warn!("Stream for {} ended without a terminal event", turn.message_id);
        conv.record(
            DiagnosticLevel::Warn,
            None,
            now,
            "stream ended without a terminal event",
        );

        let mut changes = Vec::new();
        if self.finalize_active(conv, turn) {
            changes.push(Change::MessageUpdated(turn.message_id.clone()));
        }
        changes.push(self.end_turn(conv, turn, TurnEnd::Drained));
        changes
    }

    /// Transport failure or abort: turn the active message into an error notice.
    ///
    /// `end` should be [`TurnEnd::Failed`] or [`TurnEnd::Aborted`].
    pub fn fail_turn(
        &self,
        conv: &mut Conversation,
        turn: &mut TurnState,
        reason: &str,
        end: TurnEnd,
        now: f64,
    ) -> Vec<Change> {
        if turn.is_ended() {
            return vec![];
        }
        conv.record(DiagnosticLevel::Warn, None, now, format!("turn failed: {}", reason));

        let mut changes = Vec::new();
        if self.mark_error(conv, turn, reason) {
            changes.push(Change::MessageUpdated(turn.message_id.clone()));
        }
        changes.push(self.end_turn(conv, turn, end));
        changes
    }

    fn end_turn(&self, conv: &mut Conversation, turn: &mut TurnState, end: TurnEnd) -> Change {
        turn.ended = Some(end);
        conv.is_processing = false;
        tracing::info!("Turn {} ended: {:?}", turn.message_id, end);
        Change::TurnEnded(end)
    }

    /// Attach accumulated steps and calls and stop streaming. False if the message is gone.
    fn finalize_active(&self, conv: &mut Conversation, turn: &TurnState) -> bool {
        match conv.message_mut(&turn.message_id) {
            Some(msg) => {
                msg.thinking_steps = turn.thinking.clone();
                msg.tool_calls = turn.tool_calls.snapshot();
                msg.is_streaming = false;
                true
            }
            None => false,
        }
    }

    fn mark_error(&self, conv: &mut Conversation, turn: &TurnState, reason: &str) -> bool {
        if !self.finalize_active(conv, turn) {
            return false;
        }
        if let Some(msg) = conv.message_mut(&turn.message_id) {
            msg.role = Role::Error;
            msg.content = format!("Error: {}", reason);
            msg.is_rich_text = false;
        }
        true
    }

    /// Run `f` on the active message if it is still streaming
    fn with_active<F>(&self, conv: &mut Conversation, turn: &TurnState, f: F) -> Vec<Change>
    where
        F: FnOnce(&mut ConversationMessage),
    {
        match conv.message_mut(&turn.message_id) {
            Some(msg) if msg.is_streaming => {
                f(msg);
                vec![Change::MessageUpdated(turn.message_id.clone())]
            }
            _ => {
                tracing::warn!("Active message {} is not streaming", turn.message_id);
                vec![]
            }
        }
    }

    fn push_step(
        &self,
        conv: &mut Conversation,
        turn: &mut TurnState,
        event: &StreamEvent,
        content: String,
        label: StepLabel,
    ) -> Vec<Change> {
        turn.thinking.push(ThinkingStep {
            content,
            kind: event.kind.clone(),
            timestamp: event.timestamp,
            label,
        });
        let steps = turn.thinking.clone();
        self.with_active(conv, turn, |msg| msg.thinking_steps = steps)
    }

    fn on_thinking(&self, conv: &mut Conversation, turn: &mut TurnState, event: &StreamEvent) -> Vec<Change> {
        let Some(surfaced) = self.classifier.classify_thinking(&event.content) else {
            return vec![];
        };
        conv.record(
            DiagnosticLevel::Info,
            Some(event.kind.clone()),
            event.timestamp,
            format!("{}: {}", surfaced.label, surfaced.content),
        );

        let changes = self.push_step(conv, turn, event, surfaced.content, surfaced.label);
        let steps = turn.thinking.len();
        let tools = turn.tool_calls.len();
        if let Some(msg) = conv.message_mut(&turn.message_id) {
            if msg.is_streaming {
                msg.content = if tools > 0 {
                    format!("Preparing tool calls... ({} tools)", tools)
                } else {
                    format!("Thinking... ({} steps)", steps)
                };
            }
        }
        changes
    }

    fn on_note(&self, conv: &mut Conversation, turn: &mut TurnState, event: &StreamEvent) -> Vec<Change> {
        if event.metadata.str("message_type") == Some(TOOL_SUMMARY) {
            conv.record(
                DiagnosticLevel::Info,
                Some(event.kind.clone()),
                event.timestamp,
                format!("tool summary skipped: {}", event.content_prefix(30)),
            );
            return vec![];
        }

        let surfaced = self.classifier.classify_note(&event.content);
        conv.record(
            DiagnosticLevel::Info,
            Some(event.kind.clone()),
            event.timestamp,
            format!("assistant: {}", surfaced.content),
        );
        self.push_step(conv, turn, event, surfaced.content, surfaced.label)
    }

    fn on_tool_call(&self, conv: &mut Conversation, turn: &mut TurnState, event: &StreamEvent) -> Vec<Change> {
        let meta = &event.metadata;
        let id = match meta.str("call_id") {
            Some(id) => id.to_string(),
            None => {
                let id = format!("anonymous_{}", turn.tool_calls.len() + 1);
                conv.record(
                    DiagnosticLevel::Warn,
                    Some(event.kind.clone()),
                    event.timestamp,
                    format!("tool call without call_id; using {}", id),
                );
                id
            }
        };
        let tool_name = meta.str("tool_name").unwrap_or_default();
        let display_name = meta
            .str("tool_display_name")
            .or(meta.str("tool_name"))
            .unwrap_or("tool call");

        // Records always start as calling; only a tool-result resolves them
        if let Some(status) = meta.str("status") {
            if ToolStatus::from_wire(status) != Some(ToolStatus::Calling) {
                conv.record(
                    DiagnosticLevel::Info,
                    Some(event.kind.clone()),
                    event.timestamp,
                    format!("tool call {} announced as {}; tracked as calling", id, status),
                );
            }
        }

        let record = ToolCallRecord::calling(&id, tool_name, display_name, event.timestamp);
        if !turn.tool_calls.register(record) {
            tracing::warn!("Tool call {} registered twice in one turn", id);
            conv.record(
                DiagnosticLevel::Warn,
                Some(event.kind.clone()),
                event.timestamp,
                format!("tool call {} already registered; ignored", id),
            );
            return vec![];
        }
        conv.record(
            DiagnosticLevel::Info,
            Some(event.kind.clone()),
            event.timestamp,
            format!("tool call: {}", display_name),
        );

        let changes = self.push_step(
            conv,
            turn,
            event,
            display_name.to_string(),
            StepLabel::ExecutingTool,
        );
        let calls = turn.tool_calls.snapshot();
        if let Some(msg) = conv.message_mut(&turn.message_id) {
            if msg.is_streaming {
                msg.tool_calls = calls;
            }
        }
        changes
    }

    fn on_tool_result(&self, conv: &mut Conversation, turn: &mut TurnState, event: &StreamEvent) -> Vec<Change> {
        let meta = &event.metadata;
        let result = if event.content.is_empty() {
            meta.str("result").unwrap_or_default()
        } else {
            event.content.as_str()
        };
        let Some(call_id) = meta.str("call_id") else {
            conv.record(
                DiagnosticLevel::Warn,
                Some(event.kind.clone()),
                event.timestamp,
                "tool result without call_id; ignored",
            );
            return vec![];
        };
        if result.is_empty() {
            conv.record(
                DiagnosticLevel::Warn,
                Some(event.kind.clone()),
                event.timestamp,
                format!("tool result for {} has no content; ignored", call_id),
            );
            return vec![];
        }

        let status = match meta.str("status") {
            Some("error") => ToolStatus::Error,
            _ => ToolStatus::Completed,
        };

        let record = match turn.tool_calls.resolve(call_id, status, result, event.timestamp) {
            Ok(record) => record.clone(),
            Err(ResolveError::Unknown) => {
                tracing::warn!("Tool result for unknown call id {}", call_id);
                conv.record(
                    DiagnosticLevel::Warn,
                    Some(event.kind.clone()),
                    event.timestamp,
                    format!("tool result for unknown call {}; ignored", call_id),
                );
                return vec![];
            }
            Err(ResolveError::AlreadyResolved(previous)) => {
                conv.record(
                    DiagnosticLevel::Warn,
                    Some(event.kind.clone()),
                    event.timestamp,
                    format!("tool call {} already {:?}; result ignored", call_id, previous),
                );
                return vec![];
            }
        };

        let done = turn.tool_calls.completed_count();
        let total = turn.tool_calls.len();
        let calls = turn.tool_calls.snapshot();
        let mut changes = self.with_active(conv, turn, |msg| {
            msg.tool_calls = calls;
            msg.content = format!("Processing tool results... ({}/{} completed)", done, total);
        });

        let result_id = format!("tool-result-{}-{}-{}", turn.message_id, call_id, event.timestamp);
        if !conv.contains(&result_id) {
            let content = format!("## {} result\n\n{}", record.display_name, result);
            conv.messages.push(ConversationMessage::tool_result(
                result_id.clone(),
                content,
                record.clone(),
                event.timestamp,
            ));
            changes.push(Change::MessageAppended(result_id));
        }
        conv.record(
            DiagnosticLevel::Info,
            Some(event.kind.clone()),
            event.timestamp,
            format!(
                "tool result shown: {} ({} chars)",
                record.display_name,
                result.chars().count()
            ),
        );
        changes
    }

    fn on_pause(&self, conv: &mut Conversation, turn: &mut TurnState, event: &StreamEvent) -> Vec<Change> {
        let id = format!("pause_{}_{}", turn.message_id, event.timestamp);
        self.on_terminal(conv, turn, event, id, event.content.clone(), TurnEnd::Paused)
    }

    fn on_final(&self, conv: &mut Conversation, turn: &mut TurnState, event: &StreamEvent) -> Vec<Change> {
        if event.metadata.str("message_type") == Some(PAUSE_DISCRIMINATOR) {
            conv.record(
                DiagnosticLevel::Info,
                Some(event.kind.clone()),
                event.timestamp,
                "final repeats an interactive pause; skipped",
            );
            return vec![];
        }
        let id = format!("final_{}_{}", turn.message_id, event.timestamp);
        let changes = self.on_terminal(
            conv,
            turn,
            event,
            id,
            normalize_reply(&event.content),
            TurnEnd::Completed,
        );
        turn.thinking.clear();
        turn.tool_calls = ToolCallRegistry::new();
        changes
    }

    fn on_terminal(
        &self,
        conv: &mut Conversation,
        turn: &mut TurnState,
        event: &StreamEvent,
        reply_id: String,
        reply: String,
        end: TurnEnd,
    ) -> Vec<Change> {
        let mut changes = Vec::new();
        if self.apply_terminal_agenda(conv, event) {
            changes.push(Change::AgendaUpdated);
        }

        if conv.contains(&reply_id) {
            conv.record(
                DiagnosticLevel::Info,
                Some(event.kind.clone()),
                event.timestamp,
                format!("reply {} already shown; skipped", reply_id),
            );
        } else {
            if self.finalize_active(conv, turn) {
                changes.push(Change::MessageUpdated(turn.message_id.clone()));
            }
            conv.messages.push(ConversationMessage::assistant(
                reply_id.clone(),
                reply,
                event.timestamp,
            ));
            changes.push(Change::MessageAppended(reply_id));
        }

        changes.push(self.end_turn(conv, turn, end));
        changes
    }

    /// Parse the agenda carried by a terminal event, if any. True if the agenda changed.
    fn apply_terminal_agenda(&self, conv: &mut Conversation, event: &StreamEvent) -> bool {
        let Some((field, value)) = event.metadata.first_present(&self.config.agenda_fields) else {
            let keys: Vec<&str> = event.metadata.keys().collect();
            conv.record(
                DiagnosticLevel::Warn,
                Some(event.kind.clone()),
                event.timestamp,
                format!("no agenda in {}; metadata keys: {}", event.kind, keys.join(", ")),
            );
            return false;
        };

        let summary = match value {
            serde_json::Value::String(text) => {
                let summary = parse_agenda(text);
                if summary.is_empty() {
                    conv.record(
                        DiagnosticLevel::Warn,
                        Some(event.kind.clone()),
                        event.timestamp,
                        format!("agenda in {} has no checklist items", field),
                    );
                }
                summary
            }
            other => match serde_json::from_value::<AgendaSummary>(other.clone()) {
                Ok(summary) => summary,
                Err(e) => {
                    conv.record(
                        DiagnosticLevel::Warn,
                        Some(event.kind.clone()),
                        event.timestamp,
                        format!("agenda in {} is not usable: {}", field, e),
                    );
                    return false;
                }
            },
        };

        self.store_agenda(conv, event, summary);
        true
    }

    fn store_agenda(&self, conv: &mut Conversation, event: &StreamEvent, summary: AgendaSummary) {
        conv.record(
            DiagnosticLevel::Info,
            Some(event.kind.clone()),
            event.timestamp,
            format!(
                "agenda updated: {} tasks, {:.0}% complete",
                summary.total_tasks, summary.completion_rate
            ),
        );
        conv.agenda = Some(summary);
    }

    fn on_agenda_update(&self, conv: &mut Conversation, event: &StreamEvent) -> Vec<Change> {
        if let Some(value) = event.metadata.get("agenda_summary") {
            match serde_json::from_value::<AgendaSummary>(value.clone()) {
                Ok(summary) if !summary.is_empty() || value.as_object().is_some_and(|o| !o.is_empty()) => {
                    self.store_agenda(conv, event, summary);
                    return vec![Change::AgendaUpdated];
                }
                Ok(_) => {}
                Err(e) => {
                    conv.record(
                        DiagnosticLevel::Warn,
                        Some(event.kind.clone()),
                        event.timestamp,
                        format!("agenda_summary is not usable: {}", e),
                    );
                }
            }
        }

        if let Some(text) = event.metadata.str("agenda_text") {
            let summary = parse_agenda(text);
            if summary.is_empty() {
                conv.record(
                    DiagnosticLevel::Warn,
                    Some(event.kind.clone()),
                    event.timestamp,
                    "agenda_text has no checklist items",
                );
            }
            self.store_agenda(conv, event, summary);
            return vec![Change::AgendaUpdated];
        }

        conv.record(
            DiagnosticLevel::Warn,
            Some(event.kind.clone()),
            event.timestamp,
            "agenda update without agenda_summary",
        );
        vec![]
    }

    fn on_draft(&self, conv: &mut Conversation, event: &StreamEvent) {
        match event.metadata.str("draft_id") {
            Some(draft_id) if !event.content.is_empty() => conv.record(
                DiagnosticLevel::Info,
                Some(event.kind.clone()),
                event.timestamp,
                format!(
                    "draft {} updated ({} chars)",
                    draft_id,
                    event.content.chars().count()
                ),
            ),
            _ => conv.record(
                DiagnosticLevel::Warn,
                Some(event.kind.clone()),
                event.timestamp,
                "draft update missing draft_id or content",
            ),
        }
    }

    fn on_error(&self, conv: &mut Conversation, turn: &mut TurnState, event: &StreamEvent) -> Vec<Change> {
        tracing::warn!("Agent reported error: {}", event.content);
        let reason = if event.content.is_empty() {
            "the agent reported an error"
        } else {
            event.content.as_str()
        };

        let mut changes = Vec::new();
        if self.mark_error(conv, turn, reason) {
            changes.push(Change::MessageUpdated(turn.message_id.clone()));
        }
        changes.push(self.end_turn(conv, turn, TurnEnd::Failed));
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Reducer, Conversation, TurnState) {
        let reducer = Reducer::new(EngineConfig::default());
        let mut conv = Conversation::new("session_test", 100);
        let turn = reducer.begin_turn(&mut conv, "Plan a trip to Hangzhou", 0.0).unwrap();
        (reducer, conv, turn)
    }

    fn tool_call(id: &str, ts: f64) -> StreamEvent {
        StreamEvent::new(EventKind::ToolCall, "", ts)
            .with_meta("call_id", id)
            .with_meta("tool_name", "flight_search")
            .with_meta("tool_display_name", "Flight search")
            .with_meta("status", "calling")
    }

    fn tool_result(id: &str, content: &str, ts: f64) -> StreamEvent {
        StreamEvent::new(EventKind::ToolResult, content, ts)
            .with_meta("call_id", id)
            .with_meta("tool_name", "flight_search")
    }

    fn active<'a>(conv: &'a Conversation, turn: &TurnState) -> &'a ConversationMessage {
        conv.message(turn.message_id()).unwrap()
    }

    #[test]
    fn test_begin_turn_appends_placeholder() {
        let (_, conv, turn) = setup();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(turn.message_id(), "ai_1");
        assert!(active(&conv, &turn).is_streaming);
        assert!(conv.is_processing);
    }

    #[test]
    fn test_begin_turn_rejects_while_processing() {
        let (reducer, mut conv, _turn) = setup();
        assert!(matches!(
            reducer.begin_turn(&mut conv, "again", 1.0),
            Err(Error::TurnInProgress)
        ));
        assert_eq!(conv.messages.len(), 2);
    }

    #[test]
    fn test_begin_turn_rejects_blank() {
        let reducer = Reducer::new(EngineConfig::default());
        let mut conv = Conversation::new("s", 10);
        assert!(matches!(
            reducer.begin_turn(&mut conv, "   ", 0.0),
            Err(Error::EmptyMessage)
        ));
        assert!(!conv.is_processing);
    }

    #[test]
    fn test_duplicate_event_applied_once() {
        let (reducer, mut conv, mut turn) = setup();
        let event = tool_call("c1", 1.0);
        assert!(matches!(reducer.apply(&mut conv, &mut turn, &event), Outcome::Applied(_)));
        assert_eq!(reducer.apply(&mut conv, &mut turn, &event), Outcome::Duplicate);
        assert_eq!(turn.tool_calls().len(), 1);
        assert_eq!(active(&conv, &turn).tool_calls.len(), 1);
        assert_eq!(active(&conv, &turn).thinking_steps.len(), 1);
    }

    #[test]
    fn test_tool_lifecycle() {
        let (reducer, mut conv, mut turn) = setup();
        reducer.apply(&mut conv, &mut turn, &tool_call("c1", 1.0));
        assert_eq!(active(&conv, &turn).tool_calls[0].status, ToolStatus::Calling);

        let outcome = reducer.apply(&mut conv, &mut turn, &tool_result("c1", "CA1234 08:00", 2.0));
        let record = turn.tool_calls().get("c1").unwrap();
        assert_eq!(record.status, ToolStatus::Completed);
        assert_eq!(record.result.as_deref(), Some("CA1234 08:00"));
        assert_eq!(record.resolved_at, Some(2.0));

        let msg = active(&conv, &turn);
        assert_eq!(msg.content, "Processing tool results... (1/1 completed)");
        assert!(msg.is_streaming);
        assert_eq!(msg.tool_calls[0].status, ToolStatus::Completed);

        let result_msg = conv.messages.last().unwrap();
        assert_eq!(result_msg.role, Role::ToolResult);
        assert_eq!(result_msg.content, "## Flight search result\n\nCA1234 08:00");
        assert!(!result_msg.is_streaming);
        assert_eq!(
            outcome.changes(),
            &[
                Change::MessageUpdated("ai_1".into()),
                Change::MessageAppended(result_msg.id.clone())
            ]
        );

        // A repeated result with a new timestamp resolves nothing
        let again = reducer.apply(&mut conv, &mut turn, &tool_result("c1", "other", 3.0));
        assert!(again.changes().is_empty());
        assert_eq!(
            turn.tool_calls().get("c1").unwrap().result.as_deref(),
            Some("CA1234 08:00")
        );
    }

    #[test]
    fn test_tool_result_error_status() {
        let (reducer, mut conv, mut turn) = setup();
        reducer.apply(&mut conv, &mut turn, &tool_call("c1", 1.0));
        let failed = tool_result("c1", "upstream timeout", 2.0).with_meta("status", "error");
        reducer.apply(&mut conv, &mut turn, &failed);
        assert_eq!(turn.tool_calls().get("c1").unwrap().status, ToolStatus::Error);
        assert_eq!(
            active(&conv, &turn).content,
            "Processing tool results... (0/1 completed)"
        );
    }

    #[test]
    fn test_tool_call_wire_status_does_not_resolve() {
        let (reducer, mut conv, mut turn) = setup();
        let announced = StreamEvent::new(EventKind::ToolCall, "", 1.0)
            .with_meta("call_id", "c1")
            .with_meta("tool_name", "weather")
            .with_meta("tool_display_name", "Weather")
            .with_meta("status", "completed");
        reducer.apply(&mut conv, &mut turn, &announced);
        assert_eq!(turn.tool_calls().get("c1").unwrap().status, ToolStatus::Calling);
        assert!(conv.diagnostics().any(|d| d.message.contains("announced as completed")));

        let outcome = reducer.apply(&mut conv, &mut turn, &tool_result("c1", "sunny", 2.0));
        assert!(!outcome.changes().is_empty());
        let record = turn.tool_calls().get("c1").unwrap();
        assert_eq!(record.status, ToolStatus::Completed);
        assert_eq!(record.result.as_deref(), Some("sunny"));
        assert_eq!(record.resolved_at, Some(2.0));
        let results: Vec<_> = conv
            .messages
            .iter()
            .filter(|m| m.role == Role::ToolResult)
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "## Weather result\n\nsunny");
    }

    #[test]
    fn test_unknown_tool_result_mutates_nothing() {
        let (reducer, mut conv, mut turn) = setup();
        reducer.apply(&mut conv, &mut turn, &tool_call("c1", 1.0));
        let before = conv.messages.clone();

        let outcome = reducer.apply(&mut conv, &mut turn, &tool_result("c9", "stray", 2.0));
        assert!(outcome.changes().is_empty());
        assert_eq!(conv.messages, before);
        assert_eq!(turn.tool_calls().get("c1").unwrap().status, ToolStatus::Calling);
        assert!(
            conv.diagnostics()
                .any(|d| d.level == DiagnosticLevel::Warn && d.message.contains("c9"))
        );
    }

    #[test]
    fn test_thinking_updates_step_count() {
        let (reducer, mut conv, mut turn) = setup();
        let event = StreamEvent::new(
            EventKind::Thinking,
            "经过分析，我决定调用航班搜索工具来查找从北京到上海的航班",
            1.0,
        );
        reducer.apply(&mut conv, &mut turn, &event);
        let msg = active(&conv, &turn);
        assert_eq!(msg.thinking_steps.len(), 1);
        assert_eq!(msg.thinking_steps[0].label, StepLabel::ToolSelection);
        assert_eq!(msg.content, "Thinking... (1 steps)");

        // Filler thinking is recorded but not surfaced
        let filler = StreamEvent::new(EventKind::Thinking, "正在初始化...", 2.0);
        assert_eq!(
            reducer.apply(&mut conv, &mut turn, &filler),
            Outcome::Applied(vec![])
        );
        assert_eq!(active(&conv, &turn).thinking_steps.len(), 1);
    }

    #[test]
    fn test_tool_summary_note_suppressed() {
        let (reducer, mut conv, mut turn) = setup();
        let summary = StreamEvent::new(EventKind::AssistantMessage, "3 tools ran", 1.0)
            .with_meta("message_type", "tool_summary");
        reducer.apply(&mut conv, &mut turn, &summary);
        assert!(active(&conv, &turn).thinking_steps.is_empty());

        let note = StreamEvent::new(EventKind::AssistantMessage, "工具 hotel_search 执行完成", 2.0)
            .with_meta("message_type", "general");
        reducer.apply(&mut conv, &mut turn, &note);
        let steps = &active(&conv, &turn).thinking_steps;
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].label, StepLabel::ExecutionComplete);
        assert_eq!(steps[0].content, "hotel_search completed");
    }

    #[test]
    fn test_pause_finalizes_and_parses_agenda() {
        let (reducer, mut conv, mut turn) = setup();
        reducer.apply(&mut conv, &mut turn, &tool_call("c1", 1.0));
        let pause = StreamEvent::new(EventKind::InteractivePause, "Which dates work for you?", 5.0)
            .with_meta("agenda_doc", "")
            .with_meta("agenda", "- [ ] book hotel\n- [x] book flight");

        let outcome = reducer.apply(&mut conv, &mut turn, &pause);
        assert!(outcome.changes().contains(&Change::AgendaUpdated));
        assert!(outcome.changes().contains(&Change::TurnEnded(TurnEnd::Paused)));
        assert_eq!(turn.ended(), Some(TurnEnd::Paused));
        assert!(!conv.is_processing);

        let msg = active(&conv, &turn);
        assert!(!msg.is_streaming);
        assert_eq!(msg.tool_calls.len(), 1);

        let reply = conv.messages.last().unwrap();
        assert_eq!(reply.id, "pause_ai_1_5");
        assert_eq!(reply.content, "Which dates work for you?");
        assert_eq!(conv.agenda.as_ref().unwrap().completed_count, 1);
    }

    #[test]
    fn test_terminal_without_agenda_records_keys() {
        let (reducer, mut conv, mut turn) = setup();
        let fin = StreamEvent::new(EventKind::Final, "Done", 5.0).with_meta("session_id", "s");
        reducer.apply(&mut conv, &mut turn, &fin);
        assert!(conv.agenda.is_none());
        assert!(
            conv.diagnostics()
                .any(|d| d.message.contains("metadata keys: session_id"))
        );
    }

    #[test]
    fn test_final_normalizes_and_clears_accumulators() {
        let (reducer, mut conv, mut turn) = setup();
        reducer.apply(&mut conv, &mut turn, &tool_call("c1", 1.0));
        let fin = StreamEvent::new(EventKind::Final, "Day 1: West Lake\n\n\nDay 2: Lingyin  \n", 9.0);
        reducer.apply(&mut conv, &mut turn, &fin);

        let reply = conv.messages.last().unwrap();
        assert_eq!(reply.id, "final_ai_1_9");
        assert_eq!(reply.content, "Day 1: West Lake\n\nDay 2: Lingyin");
        assert!(reply.is_rich_text);
        assert!(turn.tool_calls().is_empty());
        // The finalised message keeps what it had accumulated
        assert_eq!(active(&conv, &turn).tool_calls.len(), 1);
        assert_eq!(turn.ended(), Some(TurnEnd::Completed));
    }

    #[test]
    fn test_final_repeating_pause_is_not_reapplied() {
        let (reducer, mut conv, mut turn) = setup();
        let pause = StreamEvent::new(EventKind::InteractivePause, "Budget?", 5.0);
        reducer.apply(&mut conv, &mut turn, &pause);
        let count = conv.messages.len();

        let fin = StreamEvent::new(EventKind::Final, "Budget?", 6.0)
            .with_meta("message_type", "interactive_pause");
        assert!(reducer.apply(&mut conv, &mut turn, &fin).changes().is_empty());
        assert_eq!(conv.messages.len(), count);
        assert_eq!(turn.ended(), Some(TurnEnd::Paused));
    }

    #[test]
    fn test_events_after_end_are_ignored() {
        let (reducer, mut conv, mut turn) = setup();
        reducer.apply(&mut conv, &mut turn, &StreamEvent::new(EventKind::Final, "ok", 5.0));
        let snapshot = conv.messages.clone();
        let late = reducer.apply(&mut conv, &mut turn, &tool_call("c2", 6.0));
        assert!(late.changes().is_empty());
        assert_eq!(conv.messages, snapshot);
    }

    #[test]
    fn test_error_event_marks_message() {
        let (reducer, mut conv, mut turn) = setup();
        let err = StreamEvent::new(EventKind::Error, "model overloaded", 3.0);
        let outcome = reducer.apply(&mut conv, &mut turn, &err);
        let msg = active(&conv, &turn);
        assert_eq!(msg.role, Role::Error);
        assert_eq!(msg.content, "Error: model overloaded");
        assert!(!msg.is_streaming);
        assert!(outcome.changes().contains(&Change::TurnEnded(TurnEnd::Failed)));
        assert!(!conv.is_processing);
    }

    #[test]
    fn test_agenda_update_uses_ready_summary() {
        let (reducer, mut conv, mut turn) = setup();
        let event = StreamEvent::new(EventKind::AgendaUpdate, "", 2.0).with_meta(
            "agenda_summary",
            serde_json::json!({"total_tasks": 4, "completed_count": 1, "completion_rate": 25.0}),
        );
        let outcome = reducer.apply(&mut conv, &mut turn, &event);
        assert_eq!(outcome.changes(), &[Change::AgendaUpdated]);
        assert_eq!(conv.agenda.as_ref().unwrap().total_tasks, 4);
    }

    #[test]
    fn test_agenda_update_falls_back_to_text() {
        let (reducer, mut conv, mut turn) = setup();
        let event = StreamEvent::new(EventKind::AgendaUpdate, "", 2.0)
            .with_meta("agenda_summary", serde_json::json!({}))
            .with_meta("agenda_text", "- [x] book flight\n- [ ] book hotel");
        reducer.apply(&mut conv, &mut turn, &event);
        assert_eq!(conv.agenda.as_ref().unwrap().completion_rate, 50.0);
    }

    #[test]
    fn test_terminal_agenda_without_items_replaces_previous() {
        let reducer = Reducer::new(EngineConfig::default());
        let mut conv = Conversation::new("s", 100);

        let mut first = reducer.begin_turn(&mut conv, "plan", 0.0).unwrap();
        let fin = StreamEvent::new(EventKind::Final, "Here is the plan", 1.0)
            .with_meta("agenda_doc", "- [ ] book hotel");
        reducer.apply(&mut conv, &mut first, &fin);
        assert_eq!(conv.agenda.as_ref().unwrap().pending_count, 1);

        let mut second = reducer.begin_turn(&mut conv, "drop everything", 2.0).unwrap();
        let fin = StreamEvent::new(EventKind::Final, "Cleared", 3.0)
            .with_meta("agenda_doc", "All tasks removed.");
        let outcome = reducer.apply(&mut conv, &mut second, &fin);
        assert!(outcome.changes().contains(&Change::AgendaUpdated));

        let agenda = conv.agenda.as_ref().unwrap();
        assert_eq!(agenda.total_tasks, 0);
        assert_eq!(agenda.pending_count, 0);
        assert_eq!(agenda.completion_rate, 0.0);
        assert!(conv.diagnostics().any(|d| d.message.contains("has no checklist items")));
    }

    #[test]
    fn test_agenda_update_text_without_items_replaces_previous() {
        let (reducer, mut conv, mut turn) = setup();
        let filled = StreamEvent::new(EventKind::AgendaUpdate, "", 1.0)
            .with_meta("agenda_text", "- [x] book flight");
        reducer.apply(&mut conv, &mut turn, &filled);
        assert_eq!(conv.agenda.as_ref().unwrap().completed_count, 1);

        let emptied = StreamEvent::new(EventKind::AgendaUpdate, "", 2.0)
            .with_meta("agenda_text", "nothing left");
        let outcome = reducer.apply(&mut conv, &mut turn, &emptied);
        assert_eq!(outcome.changes(), &[Change::AgendaUpdated]);
        assert!(conv.agenda.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_kind_is_diagnostic_only() {
        let (reducer, mut conv, mut turn) = setup();
        let before = conv.messages.clone();
        let event = StreamEvent::new(EventKind::from("itinerary_preview"), "x", 1.0);
        assert_eq!(
            reducer.apply(&mut conv, &mut turn, &event),
            Outcome::Applied(vec![])
        );
        assert_eq!(conv.messages, before);
        assert!(conv.diagnostics().any(|d| d.message.contains("itinerary_preview")));
    }

    #[test]
    fn test_turn_isolation() {
        let reducer = Reducer::new(EngineConfig::default());
        let mut conv = Conversation::new("s", 100);

        let mut first = reducer.begin_turn(&mut conv, "flights", 0.0).unwrap();
        reducer.apply(&mut conv, &mut first, &tool_call("c1", 1.0));
        reducer.apply(&mut conv, &mut first, &tool_result("c1", "first result", 2.0));
        reducer.apply(&mut conv, &mut first, &StreamEvent::new(EventKind::Final, "a", 3.0));

        let mut second = reducer.begin_turn(&mut conv, "hotels", 4.0).unwrap();
        // Same call id and same timestamps as the first turn
        reducer.apply(&mut conv, &mut second, &tool_call("c1", 1.0));
        assert_eq!(second.tool_calls().get("c1").unwrap().status, ToolStatus::Calling);

        let first_msg = conv.message("ai_1").unwrap();
        let second_msg = conv.message("ai_2").unwrap();
        assert_eq!(first_msg.tool_calls[0].status, ToolStatus::Completed);
        assert_eq!(second_msg.tool_calls.len(), 1);
        assert_eq!(second_msg.tool_calls[0].status, ToolStatus::Calling);
    }

    #[test]
    fn test_finish_stream_without_terminal() {
        let (reducer, mut conv, mut turn) = setup();
        reducer.apply(&mut conv, &mut turn, &tool_call("c1", 1.0));
        let changes = reducer.finish_stream(&mut conv, &mut turn, 9.0);
        assert!(changes.contains(&Change::TurnEnded(TurnEnd::Drained)));
        assert!(!active(&conv, &turn).is_streaming);
        assert!(!conv.is_processing);
        // Idempotent once ended
        assert!(reducer.finish_stream(&mut conv, &mut turn, 10.0).is_empty());
    }

    #[test]
    fn test_fail_turn_sets_error_state() {
        let (reducer, mut conv, mut turn) = setup();
        reducer.fail_turn(&mut conv, &mut turn, "connection reset", TurnEnd::Failed, 3.0);
        let msg = active(&conv, &turn);
        assert_eq!(msg.role, Role::Error);
        assert_eq!(msg.content, "Error: connection reset");
        assert!(!msg.is_streaming);
        assert_eq!(turn.ended(), Some(TurnEnd::Failed));
    }

    #[test]
    fn test_normalize_reply() {
        assert_eq!(normalize_reply("a\nb\n\n\nc"), "a\n\nb\n\nc");
        assert_eq!(normalize_reply(""), "");
        assert_eq!(normalize_reply("a  \n   \nb"), "a\n\nb");
    }

    #[test]
    fn test_normalize_reply_keeps_indentation() {
        let reply = "- Day 1\n  - West Lake\n```\n    let x = 1;\n```";
        assert_eq!(
            normalize_reply(reply),
            "- Day 1\n\n  - West Lake\n\n```\n\n    let x = 1;\n\n```"
        );
    }
}
