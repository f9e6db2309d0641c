//! Wire Protocol
//!
//! Request body and response record formats for the streaming chat endpoint.
//!
//! # Response framing
//!
//! The response body is UTF-8 text split into lines on `\n`. A line is
//! significant only if it starts with [`EVENT_PREFIX`]; the remainder is a
//! JSON object of one of these shapes:
//!
//! ```text
//! data: {"chunk": "partial text"}
//! data: {"done": true}
//! data: {"error": "reason"}
//! ```
//!
//! Everything else (blank keep-alives, comments, `event:` lines) is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::TurnRole;

/// Marker that starts every significant response line
pub const EVENT_PREFIX: &str = "data: ";

/// One prior turn sent as request context
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who authored the turn
    pub role: TurnRole,
    /// Turn text
    pub content: String,
}

impl HistoryEntry {
    /// Create a history entry
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of a streaming chat request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The new user message
    pub message: String,
    /// Prior transcript, oldest first
    pub history: Vec<HistoryEntry>,
}

impl ChatRequest {
    /// Create a request with no history
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }

    /// Set the prior transcript
    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }
}

/// A decoded unit from the response stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text to append to the open turn
    Delta(String),
    /// Normal end of stream
    Complete,
    /// Server-reported failure
    Failed(String),
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

/// Result of classifying one complete line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Line does not carry the event marker
    Ignored,
    /// Line decoded into an event
    Event(StreamEvent),
    /// Line carried the marker but no usable record
    Malformed(String),
}

/// Raw response record
///
/// Fields are kept loosely typed so that one mistyped field does not hide
/// its siblings. Each is classified on its own in [`WireRecord::into_event`].
#[derive(Debug, Default, Deserialize)]
struct WireRecord {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    done: Option<Value>,
    #[serde(default)]
    chunk: Option<Value>,
}

impl WireRecord {
    /// Error takes precedence over done, done over chunk.
    ///
    /// Any error value other than `null`, `false`, `0` or `""` is a failure.
    /// Only `done: true` completes the stream and only a string chunk is text.
    fn into_event(self) -> Option<StreamEvent> {
        if let Some(message) = self.error.as_ref().and_then(error_message) {
            return Some(StreamEvent::Failed(message));
        }
        if matches!(self.done, Some(Value::Bool(true))) {
            return Some(StreamEvent::Complete);
        }
        match self.chunk {
            Some(Value::String(text)) => Some(StreamEvent::Delta(text)),
            _ => None,
        }
    }
}

/// Message for a reported error, `None` when the value is falsy
fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

/// Classify one complete line (without its `\n` terminator)
#[must_use]
pub fn parse_line(line: &str) -> LineOutcome {
    let Some(payload) = line.strip_prefix(EVENT_PREFIX) else {
        return LineOutcome::Ignored;
    };

    match serde_json::from_str::<WireRecord>(payload) {
        Ok(record) => match record.into_event() {
            Some(event) => LineOutcome::Event(event),
            None => LineOutcome::Malformed("record has no error, done or chunk field".to_string()),
        },
        Err(e) => LineOutcome::Malformed(e.to_string()),
    }
}
