//! Chatstream Core - Headless Streaming Conversation Client
//!
//! This crate holds the conversation logic of chatstream, independent of any
//! presentation layer. It sends a user message with the prior transcript to
//! the assistant server, reads back the line-framed event stream, and grows
//! the assistant's turn as text arrives.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Surfaces                                 │
//! │        ┌─────────┐   ┌──────────┐   ┌──────────────────────┐     │
//! │        │   CLI   │   │   GUI    │   │  Headless / Tests    │     │
//! │        └────┬────┘   └────┬─────┘   └──────────┬───────────┘     │
//! │             └─────────────┴────────────────────┘                 │
//! │                  submit(text) ▼   ▲ SessionUpdate                │
//! └─────────────────────────────────┼────────────────────────────────┘
//!                                   │
//! ┌─────────────────────────────────┼────────────────────────────────┐
//! │                        CHATSTREAM CORE                           │
//! │  ┌──────────────────────────────┴─────────────────────────────┐  │
//! │  │                        ChatSession                         │  │
//! │  │  ┌────────────┐  ┌────────────────┐  ┌──────────────────┐  │  │
//! │  │  │ Transcript │◀─│ StreamIngestor │◀─│   ChatBackend    │  │  │
//! │  │  │   Store    │  │ (EventStream)  │  │     (HTTP)       │  │  │
//! │  │  └────────────┘  └────────────────┘  └──────────────────┘  │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatSession`]: owns one transcript and drives one request at a time
//! - [`Transcript`]: ordered turns with handle-keyed mutation
//! - [`StreamIngestor`]: request lifecycle and event application
//! - [`EventStream`]: pull-based stream of decoded [`StreamEvent`]s
//! - [`ChatBackend`]: transport seam, implemented by [`HttpBackend`]
//!
//! # Quick Start
//!
//! ```ignore
//! use chatstream_core::{load_config, ChatSession, HttpBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let backend = HttpBackend::from_config(&config)?;
//!     let mut session = ChatSession::with_config(backend, &config);
//!     let mut updates = session.subscribe(config.update_buffer);
//!
//!     let report = session.submit("What are the symptoms of influenza?").await?;
//!     println!("{:?}", report.outcome);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`analysis`]: one-shot document analysis upload
//! - [`backend`]: transport abstraction and HTTP implementation
//! - [`config`]: TOML/environment/CLI configuration
//! - [`decoder`]: byte chunks to lines to events
//! - [`messages`]: identifiers and roles
//! - [`protocol`]: request body and response record formats
//! - [`session`]: submission path and presentation updates
//! - [`streaming`]: event stream, ingestor and cancellation
//! - [`transcript`]: the transcript store

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod backend;
pub mod config;
pub mod decoder;
pub mod messages;
pub mod protocol;
pub mod session;
pub mod streaming;
pub mod transcript;

// Re-exports for convenience
pub use analysis::{AnalysisClient, AnalysisError, DocumentAnalysis, DocumentUpload};
pub use backend::{ByteStream, ChatBackend, HttpBackend, HttpBackendConfig, TransportError};
pub use decoder::{DecodeStats, LineDecoder};
pub use messages::{SessionId, TurnId, TurnRole, TurnState};
pub use protocol::{ChatRequest, HistoryEntry, StreamEvent, EVENT_PREFIX};
pub use session::{ChatSession, SessionError, SessionStats, SessionUpdate};
pub use streaming::{
    CancelHandle, CancelToken, EventStream, FailureKind, IngestOptions, IngestOutcome,
    IngestReport, IngestState, StreamIngestor, APOLOGY_MESSAGE,
};
pub use transcript::{Transcript, TranscriptError, TranscriptSnapshot, Turn, TurnHandle};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
