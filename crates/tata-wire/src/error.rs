//! Error types for tata-wire

use thiserror::Error;

/// Result type alias using tata-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding the event stream
#[derive(Error, Debug)]
pub enum Error {
    /// A record carried the data prefix but its payload was not a valid event
    #[error("Malformed record: {reason} (line: {line})")]
    Malformed { line: String, reason: String },

    /// Reading from the underlying transport failed
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Create a malformed-record error from the offending line and a reason
    pub fn malformed(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error only affects a single record.
    ///
    /// Record-level errors are skipped by the read loop; anything else ends the turn.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Error::Malformed { .. })
    }
}
