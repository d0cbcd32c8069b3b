//! Chat session driver: one read loop per turn

use futures::StreamExt;
use std::sync::Arc;
use tata_wire::{ChatRequest, Frame, boxed_frames};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    classify::ThinkingClassifier,
    config::EngineConfig,
    conversation::Conversation,
    error::{Error, Result},
    events::SessionUpdate,
    handle::SessionHandle,
    reducer::{Change, Reducer, TurnEnd, TurnState},
    transport::Transport,
};

/// Current wall-clock time in fractional seconds
fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Generate a new session identifier
pub fn new_session_id() -> String {
    format!("session_{}", uuid::Uuid::new_v4().simple())
}

/// A conversation with the remote agent.
///
/// Owns the conversation state and drives one turn at a time: it sends the
/// request through the [`Transport`], decodes the response body and feeds every
/// event to the [`Reducer`], publishing a [`SessionUpdate`] for each change.
pub struct ChatSession {
    conversation: Conversation,
    reducer: Reducer,
    transport: Arc<dyn Transport>,
    user_id: String,
    event_tx: broadcast::Sender<SessionUpdate>,
    handle: SessionHandle,
}

impl ChatSession {
    /// Create a session with a fresh session id
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(256);
        Ok(Self {
            conversation: Conversation::new(new_session_id(), config.max_diagnostics),
            reducer: Reducer::new(config),
            transport,
            user_id: ChatRequest::DEFAULT_USER_ID.to_string(),
            event_tx,
            handle: SessionHandle::new(),
        })
    }

    /// Replace the thinking classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn ThinkingClassifier>) -> Self {
        self.reducer = Reducer::with_classifier(self.reducer.config().clone(), classifier);
        self
    }

    /// Set the account requests are made for
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Continue an existing session instead of starting a new one
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.conversation.session_id = session_id.into();
        self
    }

    /// Subscribe to state updates
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.event_tx.subscribe()
    }

    /// Get a handle for aborting from another task
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Current conversation state
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn session_id(&self) -> &str {
        &self.conversation.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Whether a turn is being processed
    pub fn is_processing(&self) -> bool {
        self.conversation.is_processing
    }

    /// Send a user message and process the agent's streamed response.
    ///
    /// Returns how the turn ended. Transport failures and aborts are returned as
    /// errors after the active message has been put into the error state.
    pub async fn send(&mut self, text: &str) -> Result<TurnEnd> {
        let mut turn = self
            .reducer
            .begin_turn(&mut self.conversation, text, now_secs())?;
        let cancel = self.handle.start_turn();

        let turn_number = self.conversation.turns;
        let _ = self.event_tx.send(SessionUpdate::TurnStarted {
            turn: turn_number,
            message_id: turn.message_id().to_string(),
        });
        for message in &self.conversation.messages[self.conversation.messages.len() - 2..] {
            let _ = self.event_tx.send(SessionUpdate::MessageAppended {
                message: message.clone(),
            });
        }

        let request = ChatRequest::new(text.trim(), self.session_id(), &self.user_id);
        let result = self.read_turn(&mut turn, &request, cancel).await;

        let changes = match &result {
            Ok(()) => self
                .reducer
                .finish_stream(&mut self.conversation, &mut turn, now_secs()),
            Err(Error::Aborted) => self.reducer.fail_turn(
                &mut self.conversation,
                &mut turn,
                "request aborted",
                TurnEnd::Aborted,
                now_secs(),
            ),
            Err(e) => {
                tracing::warn!("Turn {} failed: {}", turn_number, e);
                let reason = match e {
                    Error::Transport(reason) => reason.clone(),
                    other => other.to_string(),
                };
                self.reducer.fail_turn(
                    &mut self.conversation,
                    &mut turn,
                    &reason,
                    TurnEnd::Failed,
                    now_secs(),
                )
            }
        };
        self.publish(&changes);
        self.handle.finish_turn();

        result?;
        Ok(turn.ended().unwrap_or(TurnEnd::Drained))
    }

    async fn read_turn(
        &mut self,
        turn: &mut TurnState,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<()> {
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Aborted),
            opened = self.transport.open(request, cancel.clone()) => opened?,
        };
        // Keep the bare transport reason so the error notice reads the same
        // whether the request failed to open or the body broke mid-turn
        let mut frames = boxed_frames(body.map(|item| {
            item.map_err(|e| match e {
                Error::Transport(reason) => reason,
                other => other.to_string(),
            })
        }));

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Aborted),
                next = frames.next() => next,
            };

            match next {
                None | Some(Ok(Frame::Done)) => return Ok(()),
                Some(Ok(Frame::Event(event))) => {
                    let outcome = self.reducer.apply(&mut self.conversation, turn, &event);
                    self.publish(outcome.changes());
                }
                Some(Err(tata_wire::Error::Transport(reason))) => {
                    return Err(Error::Transport(reason));
                }
                Some(Err(e)) => {
                    self.reducer
                        .record_malformed(&mut self.conversation, &e, now_secs());
                }
            }
        }
    }

    fn publish(&self, changes: &[Change]) {
        for change in changes {
            let update = match change {
                Change::MessageUpdated(id) => self
                    .conversation
                    .message(id)
                    .map(|m| SessionUpdate::MessageUpdated { message: m.clone() }),
                Change::MessageAppended(id) => self
                    .conversation
                    .message(id)
                    .map(|m| SessionUpdate::MessageAppended { message: m.clone() }),
                Change::AgendaUpdated => self
                    .conversation
                    .agenda
                    .clone()
                    .map(|agenda| SessionUpdate::AgendaUpdated { agenda }),
                Change::TurnEnded(end) => Some(SessionUpdate::TurnEnded {
                    turn: self.conversation.turns,
                    end: *end,
                }),
            };
            if let Some(update) = update {
                let _ = self.event_tx.send(update);
            }
        }
    }
}
