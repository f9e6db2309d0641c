//! Chat Backend Traits
//!
//! The transport seam between the session and the server. The session only
//! needs one thing from a backend: send a request once and hand back the raw
//! response body as a stream of byte chunks. Decoding those chunks is not the
//! backend's concern.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::protocol::ChatRequest;

/// Raw response body, chunked as the transport delivered it
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Failures below the protocol layer
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Request could not be sent (refused, DNS, TLS, ...)
    #[error("Request to {url} failed: {reason}")]
    Connect {
        /// Endpoint that was called
        url: String,
        /// Underlying error description
        reason: String,
    },

    /// Server answered with a non-success status
    #[error("Server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if readable
        body: String,
    },

    /// Reading the response body failed mid-stream
    #[error("Response body read failed: {0}")]
    Read(String),

    /// No bytes arrived within the idle window
    #[error("No data received for {0:?}")]
    IdleTimeout(Duration),
}

/// Chat backend trait
///
/// Implement this to point a session at a different transport. Tests use a
/// scripted implementation; production uses [`super::HttpBackend`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    /// Send `request` once and return the response body stream
    ///
    /// Returning `Ok` means the server accepted the request; the stream then
    /// yields chunks until the peer closes the connection.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}
