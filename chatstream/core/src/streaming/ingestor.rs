//! Stream Ingestor
//!
//! Drives exactly one request to a terminal state and applies every decoded
//! event to the transcript's open turn.
//!
//! ```text
//! Idle ──▶ Opening ──▶ Streaming ──▶ Completed
//!             │            │
//!             └────────────┴───────▶ Failed | Cancelled
//! ```
//!
//! `Opening` lasts until the first byte of the body is read. A terminal state
//! is entered once; anything that arrives afterwards is a no-op.

use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};

use crate::backend::{ByteStream, ChatBackend, TransportError};
use crate::decoder::DecodeStats;
use crate::protocol::{ChatRequest, StreamEvent};
use crate::transcript::{Transcript, TurnHandle};

use super::cancel::CancelToken;
use super::event_stream::EventStream;

/// Text that replaces the open turn when a request fails
pub const APOLOGY_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Lifecycle of one request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestState {
    /// Created, request not yet sent
    Idle,
    /// Request sent, no body bytes read yet
    Opening,
    /// Body bytes are arriving
    Streaming,
    /// Ended normally
    Completed,
    /// Ended by a transport or server-reported failure
    Failed,
    /// Aborted; the transcript was left untouched from then on
    Cancelled,
}

impl IngestState {
    /// Whether this state is final
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Why a request failed
///
/// Both kinds produce the same transcript outcome; the distinction is kept
/// for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Request could not be opened or the connection broke
    Transport(String),
    /// The server sent an error record
    Protocol(String),
}

/// How a request ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Completion record or end of body
    Completed,
    /// Failure; the open turn now holds the apology text
    Failed(FailureKind),
    /// Aborted, or the turn was no longer the open one
    Cancelled,
}

/// Summary of one ingested request
#[derive(Clone, Debug)]
pub struct IngestReport {
    /// How the request ended
    pub outcome: IngestOutcome,
    /// Turn the request was writing to
    pub handle: TurnHandle,
    /// Decode counters
    pub stats: DecodeStats,
    /// Deltas appended to the turn
    pub deltas_applied: u64,
    /// Wall time from start to terminal state
    pub elapsed: Duration,
}

/// Tunables for an ingestor
#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// Replacement text for a failed turn
    pub apology: String,
    /// Longest wait for the next event before treating the stream as dead
    /// (`None` = rely on the transport alone)
    pub idle_timeout: Option<Duration>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            apology: APOLOGY_MESSAGE.to_string(),
            idle_timeout: None,
        }
    }
}

/// Result of applying one input to the transcript
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Transcript changed, more input expected
    Continue,
    /// Transcript changed, a terminal state was entered
    Finished,
    /// Already terminal; nothing changed
    Ignored,
    /// The handle no longer names the open turn; nothing changed
    Stale,
}

impl Step {
    /// Whether the transcript was modified
    #[must_use]
    pub fn mutated(&self) -> bool {
        matches!(self, Self::Continue | Self::Finished)
    }
}

/// Applies one request's stream to one open turn
#[derive(Debug)]
pub struct StreamIngestor {
    handle: TurnHandle,
    state: IngestState,
    options: IngestOptions,
    deltas_applied: u64,
    failure: Option<FailureKind>,
    started: Instant,
}

impl StreamIngestor {
    /// Create an ingestor for the open turn named by `handle`
    #[must_use]
    pub fn new(handle: TurnHandle, options: IngestOptions) -> Self {
        Self {
            handle,
            state: IngestState::Idle,
            options,
            deltas_applied: 0,
            failure: None,
            started: Instant::now(),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Apply one decoded event
    pub fn apply(&mut self, transcript: &mut Transcript, event: StreamEvent) -> Step {
        if let Some(step) = self.precheck(transcript) {
            return step;
        }
        if self.state != IngestState::Streaming {
            self.state = IngestState::Streaming;
        }

        match event {
            StreamEvent::Delta(text) => {
                if transcript.append_delta(&self.handle, &text).is_err() {
                    return self.go_stale();
                }
                self.deltas_applied += 1;
                Step::Continue
            }
            StreamEvent::Complete => self.close(transcript, IngestState::Completed, None),
            StreamEvent::Failed(message) => {
                tracing::warn!(
                    turn = %self.handle.id(),
                    error = %message,
                    "Server reported stream error"
                );
                self.failure = Some(FailureKind::Protocol(message));
                let apology = self.options.apology.clone();
                self.close(transcript, IngestState::Failed, Some(apology))
            }
        }
    }

    /// Apply a transport failure
    pub fn fail_transport(&mut self, transcript: &mut Transcript, error: &TransportError) -> Step {
        if let Some(step) = self.precheck(transcript) {
            return step;
        }
        tracing::warn!(
            turn = %self.handle.id(),
            state = ?self.state,
            error = %error,
            "Transport failure while streaming"
        );
        self.failure = Some(FailureKind::Transport(error.to_string()));
        let apology = self.options.apology.clone();
        self.close(transcript, IngestState::Failed, Some(apology))
    }

    /// Apply end of body; without an earlier terminal record this is a
    /// normal completion
    pub fn finish_transport(&mut self, transcript: &mut Transcript) -> Step {
        if let Some(step) = self.precheck(transcript) {
            return step;
        }
        tracing::debug!(turn = %self.handle.id(), "Stream closed by peer");
        self.close(transcript, IngestState::Completed, None)
    }

    /// Stop without touching the transcript again
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(turn = %self.handle.id(), state = ?self.state, "Ingest cancelled");
            self.state = IngestState::Cancelled;
        }
    }

    /// Send `request` through `backend` and ingest the response
    ///
    /// `on_mutation` runs after every change to the transcript. Returns once
    /// a terminal state is reached; the response body is dropped (and its
    /// connection aborted) before returning.
    pub async fn run<B, F>(
        mut self,
        backend: &B,
        request: &ChatRequest,
        transcript: &mut Transcript,
        cancel: &CancelToken,
        mut on_mutation: F,
    ) -> IngestReport
    where
        B: ChatBackend + ?Sized,
        F: FnMut(&Transcript),
    {
        self.state = IngestState::Opening;

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.cancel();
                return self.into_report(DecodeStats::default());
            }
            opened = open_stream(backend, request, self.options.idle_timeout) => opened,
        };

        let body = match opened {
            Ok(body) => body,
            Err(e) => {
                if self.fail_transport(transcript, &e).mutated() {
                    on_mutation(transcript);
                }
                return self.into_report(DecodeStats::default());
            }
        };

        let mut events = EventStream::new(body);
        let idle_timeout = self.options.idle_timeout;
        tracing::debug!(turn = %self.handle.id(), backend = backend.name(), "Stream opened");

        while !self.state.is_terminal() {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.cancel();
                    break;
                }
                next = next_event(&mut events, idle_timeout) => next,
            };

            if self.state == IngestState::Opening && events.stats().bytes_read > 0 {
                self.state = IngestState::Streaming;
            }

            let step = match next {
                Some(Ok(event)) => self.apply(transcript, event),
                Some(Err(e)) => self.fail_transport(transcript, &e),
                None => self.finish_transport(transcript),
            };

            if step.mutated() {
                on_mutation(transcript);
            }
        }

        let stats = events.stats();
        drop(events);
        self.into_report(stats)
    }

    /// Consume the ingestor into its report
    #[must_use]
    pub fn into_report(self, stats: DecodeStats) -> IngestReport {
        let outcome = match self.state {
            IngestState::Completed => IngestOutcome::Completed,
            IngestState::Failed => IngestOutcome::Failed(
                self.failure
                    .unwrap_or_else(|| FailureKind::Transport("unknown".to_string())),
            ),
            _ => IngestOutcome::Cancelled,
        };

        IngestReport {
            outcome,
            handle: self.handle,
            stats,
            deltas_applied: self.deltas_applied,
            elapsed: self.started.elapsed(),
        }
    }

    /// Terminal and currency checks shared by every apply path
    fn precheck(&mut self, transcript: &Transcript) -> Option<Step> {
        if self.state.is_terminal() {
            return Some(Step::Ignored);
        }
        if !transcript.is_current(&self.handle) {
            return Some(self.go_stale());
        }
        None
    }

    fn go_stale(&mut self) -> Step {
        tracing::warn!(
            turn = %self.handle.id(),
            "Turn is no longer open, dropping the rest of the stream"
        );
        self.state = IngestState::Cancelled;
        Step::Stale
    }

    fn close(
        &mut self,
        transcript: &mut Transcript,
        state: IngestState,
        final_text: Option<String>,
    ) -> Step {
        if transcript.close_turn(&self.handle, final_text).is_err() {
            return self.go_stale();
        }
        self.state = state;
        tracing::debug!(
            turn = %self.handle.id(),
            state = ?state,
            deltas = self.deltas_applied,
            "Turn closed"
        );
        Step::Finished
    }
}

/// Open the response body, giving up after `idle_timeout` without headers
async fn open_stream<B>(
    backend: &B,
    request: &ChatRequest,
    idle_timeout: Option<Duration>,
) -> Result<ByteStream, TransportError>
where
    B: ChatBackend + ?Sized,
{
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, backend.open_stream(request)).await {
            Ok(opened) => opened,
            Err(_) => Err(TransportError::IdleTimeout(limit)),
        },
        None => backend.open_stream(request).await,
    }
}

async fn next_event<S>(
    events: &mut EventStream<S>,
    idle_timeout: Option<Duration>,
) -> Option<Result<StreamEvent, TransportError>>
where
    S: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin,
{
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, events.next()).await {
            Ok(next) => next,
            Err(_) => Some(Err(TransportError::IdleTimeout(limit))),
        },
        None => events.next().await,
    }
}
