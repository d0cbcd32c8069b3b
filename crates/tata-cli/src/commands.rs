//! Slash commands for interactive mode

use std::fmt::Write;
use tata_engine::Conversation;

use crate::render::{render_agenda, render_diagnostic};

/// Diagnostic entries shown by `/debug` without an argument
const DEFAULT_DEBUG_ENTRIES: usize = 20;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Start over with a fresh session id
    NewSession,
    /// Show a message to the user (not sent to the agent)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, conversation: &Conversation) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "quit" | "exit" | "q" => CommandResult::Exit,

        "new" | "n" => CommandResult::NewSession,

        "agenda" | "a" => CommandResult::Message(match &conversation.agenda {
            Some(agenda) => render_agenda(agenda),
            None => "No agenda yet.".to_string(),
        }),

        "debug" | "d" => match parse_count(args) {
            Ok(count) => CommandResult::Message(debug_message(conversation, count)),
            Err(message) => CommandResult::Message(message),
        },

        "session" | "s" => CommandResult::Message(session_message(conversation)),

        _ => CommandResult::Unknown(command),
    })
}

fn parse_count(args: &str) -> Result<usize, String> {
    if args.is_empty() {
        return Ok(DEFAULT_DEBUG_ENTRIES);
    }
    args.parse()
        .map_err(|_| format!("Invalid entry count: {}", args))
}

fn debug_message(conversation: &Conversation, count: usize) -> String {
    let total = conversation.diagnostic_count();
    if total == 0 {
        return "No diagnostics recorded.".to_string();
    }
    let mut out = String::new();
    let skip = total.saturating_sub(count);
    let _ = writeln!(out, "Diagnostics ({} of {}):", total - skip, total);
    for diagnostic in conversation.diagnostics().skip(skip) {
        let _ = writeln!(out, "{}", render_diagnostic(diagnostic));
    }
    out
}

fn session_message(conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session: {}", conversation.session_id);
    let _ = writeln!(out, "Turns: {}", conversation.turns);
    let _ = writeln!(out, "Messages: {}", conversation.messages.len());
    let _ = writeln!(out, "Diagnostics: {}", conversation.diagnostic_count());
    match &conversation.agenda {
        Some(agenda) => {
            let _ = writeln!(
                out,
                "Agenda: {}/{} completed",
                agenda.completed_count, agenda.total_tasks
            );
        }
        None => {
            let _ = writeln!(out, "Agenda: none");
        }
    }
    out
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /agenda, /a          Show the current agenda
  /debug, /d [n]       Show the last n diagnostic entries (default 20)
  /session, /s         Show session info
  /new, /n             Start a new session
  /quit, /q, /exit     Exit

Press Ctrl+C while a reply is streaming to abort it."#
        .to_string()
}
