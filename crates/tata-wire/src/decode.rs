//! Record decoding: `data: <json>` lines into typed events

use crate::{
    error::{Error, Result},
    event::StreamEvent,
};

/// Prefix marking a data record
pub const DATA_PREFIX: &str = "data:";

/// Payload value that terminates the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded record
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A typed event
    Event(StreamEvent),
    /// The end-of-stream sentinel
    Done,
}

/// Decode one line.
///
/// Returns `Ok(None)` for lines that carry no record (blank separators, comments,
/// other SSE fields). Lines with the data prefix whose payload isn't a valid event
/// produce [`Error::Malformed`]; the caller decides whether to skip them.
pub fn decode_line(line: &str) -> Result<Option<Frame>> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        if !line.trim().is_empty() {
            tracing::trace!("Ignoring non-data line: {}", line);
        }
        return Ok(None);
    };

    // SSE allows a single optional space after the colon
    let payload = payload.strip_prefix(' ').unwrap_or(payload).trim_end();

    if payload == DONE_SENTINEL {
        return Ok(Some(Frame::Done));
    }
    if payload.is_empty() {
        return Err(Error::malformed(line, "empty payload"));
    }

    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => {
            tracing::debug!("Decoded {} event ({} chars)", event.kind, event.content.len());
            Ok(Some(Frame::Event(event)))
        }
        Err(e) => {
            tracing::warn!("Failed to decode stream record: {} (payload: {})", e, payload);
            Err(Error::malformed(line, e.to_string()))
        }
    }
}
