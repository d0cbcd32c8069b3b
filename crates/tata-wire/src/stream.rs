//! Async adapter from a transport byte stream to decoded frames

use crate::{
    buffer::ChunkBuffer,
    decode::{Frame, decode_line},
    error::{Error, Result},
};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::{fmt::Display, pin::Pin};

/// A stream of decoded frames (or per-record errors)
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Turn a chunked byte stream into frames.
///
/// Malformed records are yielded as `Err` and the stream continues. A transport
/// error is yielded as [`Error::Transport`] and ends the stream. The stream also ends
/// right after [`Frame::Done`]; bytes after the sentinel are not read.
pub fn frames<S, B, E>(body: S) -> impl Stream<Item = Result<Frame>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    stream! {
        let mut body = Box::pin(body);
        let mut buffer = ChunkBuffer::new();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    buffer.finish();
                    yield Err(Error::Transport(e.to_string()));
                    return;
                }
            };

            for line in buffer.feed(chunk) {
                match decode_line(&line) {
                    Ok(Some(Frame::Done)) => {
                        buffer.finish();
                        yield Ok(Frame::Done);
                        return;
                    }
                    Ok(Some(frame)) => yield Ok(frame),
                    Ok(None) => {}
                    Err(e) => yield Err(e),
                }
            }
        }

        let dropped = buffer.finish();
        if dropped > 0 {
            tracing::warn!("Stream ended with {} bytes of unterminated record", dropped);
        }
    }
}

/// Boxed form of [`frames`]
pub fn boxed_frames<S, B, E>(body: S) -> FrameStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(frames(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, String>> + Send + 'static {
        let owned: Vec<std::result::Result<Vec<u8>, String>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    async fn collect(stream: impl Stream<Item = Result<Frame>>) -> Vec<Result<Frame>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_frames_reassemble_split_record() {
        let out = collect(frames(chunks(&[
            "data: {\"type\":\"thin",
            "king\",\"content\":\"x\",\"timestamp\":1}\n\n",
        ])))
        .await;
        assert_eq!(out.len(), 1);
        match &out[0] {
            Ok(Frame::Event(e)) => assert_eq!(e.kind, EventKind::Thinking),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frames_stop_after_done() {
        let out = collect(frames(chunks(&[
            "data: {\"type\":\"final\"}\n\ndata: [DONE]\n\ndata: {\"type\":\"heartbeat\"}\n",
        ])))
        .await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Ok(Frame::Done)));
    }

    #[tokio::test]
    async fn test_frames_continue_past_malformed() {
        let out = collect(frames(chunks(&[
            "data: not json\n",
            "data: {\"type\":\"heartbeat\"}\n",
        ])))
        .await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_err());
        assert!(matches!(out[1], Ok(Frame::Event(_))));
    }

    #[tokio::test]
    async fn test_frames_transport_error_ends_stream() {
        let body = futures::stream::iter(vec![
            Ok(b"data: {\"type\":\"start\"}\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: {\"type\":\"heartbeat\"}\n".to_vec()),
        ]);
        let out = collect(frames(body)).await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_frames_drop_unterminated_tail() {
        let out = collect(frames(chunks(&["data: {\"type\":\"heartbeat\"}"]))).await;
        assert!(out.is_empty());
    }
}
