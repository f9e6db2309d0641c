//! HTTP Backend Implementation
//!
//! Talks to the assistant server over HTTP.
//!
//! # Server API
//!
//! - `POST /api/chat/stream` - streaming chat; JSON request body, response
//!   body is a line-framed event stream
//! - `POST /api/analyze-image` - document analysis (see [`crate::analysis`])
//!
//! The backend only opens the stream. Line framing and record decoding happen
//! in [`crate::streaming`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;

use super::traits::{ByteStream, ChatBackend, TransportError};
use crate::config::ClientConfig;
use crate::protocol::ChatRequest;

/// Connection settings for [`HttpBackend`]
#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    /// Server base URL, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Path of the streaming chat endpoint
    pub stream_path: String,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment
    pub use_system_proxy: bool,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_BASE_URL.to_string(),
            stream_path: crate::config::DEFAULT_STREAM_PATH.to_string(),
            connect_timeout: Duration::from_millis(crate::config::DEFAULT_CONNECT_TIMEOUT_MS),
            use_system_proxy: true,
        }
    }
}

impl From<&ClientConfig> for HttpBackendConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            stream_path: config.stream_path.clone(),
            connect_timeout: config.connect_timeout,
            use_system_proxy: true,
        }
    }
}

/// HTTP chat backend
#[derive(Clone, Debug)]
pub struct HttpBackend {
    /// Server base URL without trailing slash
    base_url: String,
    /// Streaming endpoint path
    stream_path: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend from explicit settings
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn new(config: HttpBackendConfig) -> Result<Self, TransportError> {
        // No total request timeout: a long answer is a long-lived response.
        // Stalls are bounded by the idle timeout in the ingest loop.
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let http_client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            stream_path: config.stream_path,
            http_client,
        })
    }

    /// Create a backend from the loaded client configuration
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(HttpBackendConfig::from(config))
    }

    /// Server base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the streaming endpoint
    #[must_use]
    pub fn stream_url(&self) -> String {
        join_url(&self.base_url, &self.stream_path)
    }

    /// Underlying HTTP client, shared with other calls to the same server
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

/// Join a base URL and an endpoint path with exactly one slash
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let url = self.stream_url();
        tracing::debug!(
            url = %url,
            history = request.history.len(),
            "Opening chat stream"
        );

        let response = self
            .http_client
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::Read(e.to_string()))
        });

        Ok(stream.boxed())
    }
}
