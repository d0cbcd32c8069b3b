//! HTTP transport for the agent's streaming chat endpoint

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;
use tata_engine::{ByteStream, ChatRequest, Error, Result, Transport};
use tokio_util::sync::CancellationToken;

/// POSTs chat requests and streams the response body back
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for `url`; a zero timeout means no timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ChatRequest, _cancel: CancellationToken) -> Result<ByteStream> {
        tracing::debug!("POST {} for session {}", self.url, request.session_id);

        let response = self
            .client
            .post(&self.url)
            .headers(Self::headers())
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = status.canonical_reason().unwrap_or("Unknown");
            return Err(Error::Transport(format!(
                "HTTP {}: {} - {}",
                status.as_u16(),
                reason,
                text.trim()
            )));
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| Error::Transport(e.to_string()))
        });
        Ok(Box::pin(body))
    }
}
