//! Error types for tata-engine

use thiserror::Error;

/// Result type alias using tata-engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a conversation turn
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Wire(#[from] tata_wire::Error),

    /// A turn is already being processed for this session
    #[error("A turn is already in progress")]
    TurnInProgress,

    /// The outgoing message was empty
    #[error("Message is empty")]
    EmptyMessage,

    /// The transport failed to open or read the response body
    #[error("Transport error: {0}")]
    Transport(String),

    /// The turn was aborted by the caller
    #[error("Request aborted")]
    Aborted,

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error ended a turn (as opposed to refusing to start one)
    pub fn ends_turn(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Aborted => true,
            Error::Wire(e) => !e.is_record_level(),
            _ => false,
        }
    }
}
