//! tata-wire: Wire protocol for the TATA assistant event stream
//!
//! The agent server answers a chat request with newline-delimited `data: <json>`
//! records, terminated by `data: [DONE]`. This crate reassembles those records from
//! arbitrarily chunked bytes and decodes them into typed [`StreamEvent`]s.

pub mod buffer;
pub mod decode;
pub mod error;
pub mod event;
pub mod stream;

pub use buffer::ChunkBuffer;
pub use decode::{DATA_PREFIX, DONE_SENTINEL, Frame, decode_line};
pub use error::{Error, Result};
pub use event::{ChatRequest, EventKind, Metadata, StreamEvent};
pub use stream::{FrameStream, boxed_frames, frames};
