//! Streaming Response Ingestion
//!
//! Turns one response body into transcript mutations.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   byte chunks   ┌──────────────┐  StreamEvent  ┌────────────────┐
//! │  ChatBackend  │ ──────────────▶ │ EventStream  │ ────────────▶ │ StreamIngestor │
//! │ (open_stream) │                 │ (LineDecoder)│               │ (state machine)│
//! └───────────────┘                 └──────────────┘               └───────┬────────┘
//!                                                                          │ append / close
//!                                                                          ▼
//!                                                                   ┌────────────┐
//!                                                                   │ Transcript │
//!                                                                   └────────────┘
//! ```
//!
//! - [`EventStream`] is a pull-based `Stream` of decoded events; chunk
//!   boundaries do not leak past it.
//! - [`StreamIngestor`] owns the request lifecycle and is the only writer of
//!   the open turn.
//! - [`CancelHandle`] aborts the in-flight request from outside the loop.

mod cancel;
mod event_stream;
mod ingestor;

pub use cancel::{CancelHandle, CancelToken};
pub use event_stream::EventStream;
pub use ingestor::{
    FailureKind, IngestOptions, IngestOutcome, IngestReport, IngestState, Step, StreamIngestor,
    APOLOGY_MESSAGE,
};

// Re-export the event type for convenience
pub use crate::protocol::StreamEvent;
