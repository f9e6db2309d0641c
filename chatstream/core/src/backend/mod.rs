//! Chat Backend Integration
//!
//! Abstracted access to the assistant server through a common trait, so the
//! session can be driven by HTTP in production and by scripted chunks in tests.
//!
//! # Usage
//!
//! ```ignore
//! use chatstream_core::backend::{ChatBackend, HttpBackend, HttpBackendConfig};
//! use chatstream_core::protocol::ChatRequest;
//!
//! let backend = HttpBackend::new(HttpBackendConfig::default())?;
//! let body = backend.open_stream(&ChatRequest::new("Hello!")).await?;
//! ```

mod http;
mod traits;

pub(crate) use http::join_url;
pub use http::{HttpBackend, HttpBackendConfig};
pub use traits::{ByteStream, ChatBackend, TransportError};
