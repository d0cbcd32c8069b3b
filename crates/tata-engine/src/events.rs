//! Session update types published to subscribers

use serde::Serialize;

use crate::{agenda::AgendaSummary, conversation::ConversationMessage, reducer::TurnEnd};

/// State changes published while a turn is processed
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// A turn started; the user message and placeholder were appended
    TurnStarted { turn: u32, message_id: String },

    /// A message was appended
    MessageAppended { message: ConversationMessage },

    /// A message changed
    MessageUpdated { message: ConversationMessage },

    /// The current agenda was replaced
    AgendaUpdated { agenda: AgendaSummary },

    /// The turn ended
    TurnEnded { turn: u32, end: TurnEnd },
}

impl SessionUpdate {
    /// Check if this is the last update of a turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionUpdate::TurnEnded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let update = SessionUpdate::TurnEnded {
            turn: 2,
            end: TurnEnd::Paused,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "turn_ended");
        assert_eq!(json["end"], "paused");
        assert!(update.is_terminal());
    }
}
