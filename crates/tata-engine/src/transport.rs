//! Transport abstraction: where the response body comes from

use async_stream::stream;
use async_trait::async_trait;
use std::pin::Pin;
use tata_wire::ChatRequest;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Raw response body, chunked however the transport delivers it
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Opens the streaming response for one chat request.
///
/// Implementations own timeouts and connection handling; a failure surfaces as
/// `Error::Transport`, either from `open` or as an item of the returned stream.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return its response body
    async fn open(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ByteStream>;
}

/// Plays back a captured response body in fixed-size chunks.
///
/// Every request receives the same body. Small chunk sizes split records (and
/// multi-byte characters) across reads, like a slow network would.
pub struct ReplayTransport {
    body: Vec<u8>,
    chunk_size: usize,
}

impl ReplayTransport {
    /// Create a replay transport; a chunk size of 0 is treated as 1
    pub fn new(body: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            body: body.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn open(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ByteStream> {
        tracing::debug!(
            "Replaying {} bytes for session {} in {}-byte chunks",
            self.body.len(),
            request.session_id,
            self.chunk_size
        );
        let chunks: Vec<Vec<u8>> = self
            .body
            .chunks(self.chunk_size)
            .map(<[u8]>::to_vec)
            .collect();

        Ok(Box::pin(stream! {
            for chunk in chunks {
                if cancel.is_cancelled() {
                    break;
                }
                yield Ok::<_, Error>(chunk);
                tokio::task::yield_now().await;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_replay_chunks_body() {
        let transport = ReplayTransport::new("data: [DONE]\n", 5);
        let request = ChatRequest::new("hi", "session_x", ChatRequest::DEFAULT_USER_ID);
        let chunks: Vec<Vec<u8>> = transport
            .open(&request, CancellationToken::new())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), b"data: [DONE]\n");
    }

    #[tokio::test]
    async fn test_replay_stops_when_cancelled() {
        let transport = ReplayTransport::new(vec![b'x'; 64], 8);
        let request = ChatRequest::new("hi", "session_x", ChatRequest::DEFAULT_USER_ID);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = transport.open(&request, cancel).await.unwrap();
        assert_eq!(stream.count().await, 0);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let transport = ReplayTransport::new("abc", 0);
        assert_eq!(transport.chunk_size, 1);
        assert_eq!(transport.len(), 3);
    }
}
