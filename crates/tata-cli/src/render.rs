//! Plain-text rendering of conversation state

use std::collections::HashMap;
use std::fmt::Write;
use tata_engine::{
    AgendaSummary, AgendaTask, ConversationMessage, Diagnostic, DiagnosticLevel, Role,
    SessionUpdate, ToolStatus, TurnEnd,
};

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "tata",
        Role::Error => "error",
        Role::ToolResult => "tool",
    }
}

fn status_mark(status: ToolStatus) -> &'static str {
    match status {
        ToolStatus::Calling => "..",
        ToolStatus::Completed => "ok",
        ToolStatus::Error => "!!",
    }
}

/// Render a finished message with its steps and tool calls
pub fn render_message(message: &ConversationMessage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {}", role_label(message.role), message.content);
    for step in &message.thinking_steps {
        let _ = writeln!(out, "    - ({}) {}", step.label, step.content);
    }
    for call in &message.tool_calls {
        let _ = writeln!(
            out,
            "    [{}] {}",
            status_mark(call.status),
            call.display_name
        );
    }
    out
}

fn task_line(out: &mut String, mark: &str, task: &AgendaTask) {
    let _ = writeln!(out, "  [{}] {}", mark, task.description);
    if let Some(result) = &task.result {
        let _ = writeln!(out, "      {}", result);
    }
}

/// Render an agenda as a checklist with a progress header
pub fn render_agenda(agenda: &AgendaSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Agenda: {}/{} tasks completed ({:.2}%)",
        agenda.completed_count, agenda.total_tasks, agenda.completion_rate
    );
    if let Some(goal) = agenda.goal() {
        let _ = writeln!(out, "Goal: {}", goal.description);
        if let Some(result) = &goal.result {
            let _ = writeln!(out, "      {}", result);
        }
    }
    let by_status = &agenda.tasks_by_status;
    for task in &by_status.in_progress {
        task_line(&mut out, "-", task);
    }
    for task in &by_status.pending {
        task_line(&mut out, " ", task);
    }
    for task in &by_status.completed {
        task_line(&mut out, "x", task);
    }
    out
}

/// Render one diagnostic entry on a single line
pub fn render_diagnostic(diagnostic: &Diagnostic) -> String {
    let level = match diagnostic.level {
        DiagnosticLevel::Info => "info",
        DiagnosticLevel::Warn => "warn",
    };
    match &diagnostic.kind {
        Some(kind) => format!(
            "{:>14.3} {:<4} {:<14} {}",
            diagnostic.timestamp,
            level,
            kind.as_str(),
            diagnostic.message
        ),
        None => format!(
            "{:>14.3} {:<4} {:<14} {}",
            diagnostic.timestamp, level, "-", diagnostic.message
        ),
    }
}

fn end_label(end: TurnEnd) -> &'static str {
    match end {
        TurnEnd::Paused => "waiting for your reply",
        TurnEnd::Completed => "done",
        TurnEnd::Failed => "failed",
        TurnEnd::Drained => "stream ended",
        TurnEnd::Aborted => "aborted",
    }
}

/// Turns session updates into printable lines.
///
/// Streaming messages are reprinted only when their status text changes;
/// finished messages are printed in full once.
#[derive(Debug, Default)]
pub struct UpdatePrinter {
    status: HashMap<String, String>,
    preview_chars: usize,
}

impl UpdatePrinter {
    pub fn new(preview_chars: usize) -> Self {
        Self {
            status: HashMap::new(),
            preview_chars,
        }
    }

    /// Lines to print for `update`, if any
    pub fn lines(&mut self, update: &SessionUpdate) -> Option<String> {
        match update {
            SessionUpdate::TurnStarted { .. } => None,
            SessionUpdate::MessageAppended { message } | SessionUpdate::MessageUpdated { message } => {
                self.message(message)
            }
            SessionUpdate::AgendaUpdated { agenda } => Some(render_agenda(agenda)),
            SessionUpdate::TurnEnded { end, .. } => {
                self.status.clear();
                Some(format!("-- {} --", end_label(*end)))
            }
        }
    }

    fn message(&mut self, message: &ConversationMessage) -> Option<String> {
        if message.role == Role::User {
            return None;
        }
        if message.is_streaming {
            if message.content.is_empty() {
                return None;
            }
            let previous = self.status.insert(message.id.clone(), message.content.clone());
            if previous.as_deref() == Some(message.content.as_str()) {
                return None;
            }
            return Some(format!(
                "  {}",
                truncate_chars(&message.content, self.preview_chars.max(1))
            ));
        }
        if self.status.get(&message.id).map(String::as_str) == Some("") {
            return None;
        }
        // Empty marker so a finished message prints once
        self.status.insert(message.id.clone(), String::new());
        Some(render_message(message))
    }
}
