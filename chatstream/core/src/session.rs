//! Chat Session
//!
//! The submission path for one conversation. A session owns its transcript,
//! holds a handle to the backend and drives one request at a time through a
//! [`StreamIngestor`].
//!
//! # Design Philosophy
//!
//! The session is presentation-agnostic. A surface (terminal, GUI, test
//! harness) submits text and receives [`SessionUpdate`]s; it never mutates the
//! transcript itself. Several sessions can exist side by side since nothing
//! here is global.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::backend::ChatBackend;
use crate::config::ClientConfig;
use crate::messages::SessionId;
use crate::protocol::ChatRequest;
use crate::streaming::{
    CancelHandle, IngestOptions, IngestOutcome, IngestReport, StreamIngestor,
};
use crate::transcript::{Transcript, TranscriptError, TranscriptSnapshot};

/// Errors returned to the submitter
#[derive(Debug, Error)]
pub enum SessionError {
    /// Blank or whitespace-only input
    #[error("Message is empty")]
    EmptyMessage,

    /// A response is still streaming
    #[error("A response is still streaming")]
    Busy,

    /// Transcript contract violation
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// Notification sent to the presentation layer after every mutation
#[derive(Clone, Debug)]
pub struct SessionUpdate {
    /// Transcript after the mutation
    pub snapshot: TranscriptSnapshot,
    /// Whether a turn is still receiving text
    pub streaming: bool,
}

/// Running totals for a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Requests sent
    pub requests: u64,
    /// Requests that completed
    pub completed: u64,
    /// Requests that failed
    pub failed: u64,
    /// Requests that were cancelled
    pub cancelled: u64,
    /// Deltas applied across all requests
    pub deltas_applied: u64,
    /// Malformed records dropped across all requests
    pub records_dropped: u64,
}

/// One conversation with the remote assistant
pub struct ChatSession<B: ChatBackend> {
    id: SessionId,
    backend: Arc<B>,
    transcript: Transcript,
    options: IngestOptions,
    max_history_turns: usize,
    updates: Option<mpsc::Sender<SessionUpdate>>,
    cancel: CancelHandle,
    stats: SessionStats,
    last_report: Option<IngestReport>,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Create a session with default options
    pub fn new(backend: B) -> Self {
        Self::with_options(Arc::new(backend), IngestOptions::default(), 0)
    }

    /// Create a session from the loaded client configuration
    pub fn with_config(backend: B, config: &ClientConfig) -> Self {
        let options = IngestOptions {
            apology: config.apology_message.clone(),
            idle_timeout: config.idle_timeout,
        };
        Self::with_options(Arc::new(backend), options, config.max_history_turns)
    }

    /// Create a session sharing `backend` with other sessions
    pub fn with_options(backend: Arc<B>, options: IngestOptions, max_history_turns: usize) -> Self {
        let id = SessionId::new();
        tracing::debug!(session = %id, backend = backend.name(), "Session created");
        Self {
            id,
            backend,
            transcript: Transcript::new(),
            options,
            max_history_turns,
            updates: None,
            cancel: CancelHandle::new(),
            stats: SessionStats::default(),
            last_report: None,
        }
    }

    /// Route updates to a new channel of the given capacity
    ///
    /// Replaces any earlier subscriber.
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<SessionUpdate> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.updates = Some(tx);
        rx
    }

    /// Session ID
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current transcript
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Immutable copy of the transcript
    #[must_use]
    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.transcript.snapshot()
    }

    /// Whether a response is streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.transcript.is_streaming()
    }

    /// Handle that aborts the in-flight request
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Running totals
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Report of the most recent request
    #[must_use]
    pub fn last_report(&self) -> Option<&IngestReport> {
        self.last_report.as_ref()
    }

    /// Submit user text and stream the reply into the transcript
    ///
    /// Returns once the reply reaches a terminal state. Transport and server
    /// failures are not errors here: they end with the apology text in the
    /// assistant turn and a `Failed` outcome in the report.
    ///
    /// # Errors
    ///
    /// - [`SessionError::EmptyMessage`] for blank input
    /// - [`SessionError::Busy`] while a previous reply is still open
    pub async fn submit(&mut self, text: impl Into<String>) -> Result<IngestReport, SessionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if self.transcript.is_streaming() {
            return Err(SessionError::Busy);
        }

        // History is the transcript before this exchange
        let history = self.transcript.history(self.max_history_turns);
        let request = ChatRequest::new(text.clone()).with_history(history);
        let (_, handle) = self.transcript.begin_exchange(text)?;
        self.stats.requests += 1;
        publish(self.updates.as_ref(), &self.transcript);

        tracing::info!(
            session = %self.id,
            turn = %handle.id(),
            history = request.history.len(),
            "Submitting message"
        );

        let token = self.cancel.begin_request();
        let ingestor = StreamIngestor::new(handle.clone(), self.options.clone());
        let updates = self.updates.clone();
        let report = ingestor
            .run(
                self.backend.as_ref(),
                &request,
                &mut self.transcript,
                &token,
                |transcript| publish(updates.as_ref(), transcript),
            )
            .await;

        // The ingestor stops writing on cancel; release the turn so the
        // session accepts the next message
        if report.outcome == IngestOutcome::Cancelled && self.transcript.is_current(&handle) {
            self.transcript.close_turn(&handle, None)?;
        }

        self.record(&report);
        self.publish_final().await;
        Ok(report)
    }

    /// Close a turn left open by a dropped `submit` future
    ///
    /// Keeps whatever content arrived. Returns whether a turn was closed.
    pub fn release_open_turn(&mut self) -> bool {
        let Some(handle) = self.transcript.open_turn().cloned() else {
            return false;
        };
        if self.transcript.close_turn(&handle, None).is_err() {
            return false;
        }
        tracing::debug!(session = %self.id, turn = %handle.id(), "Released abandoned turn");
        publish(self.updates.as_ref(), &self.transcript);
        true
    }

    /// Drop the conversation history
    ///
    /// # Errors
    ///
    /// [`SessionError::Busy`] while a reply is streaming.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        if self.transcript.is_streaming() {
            return Err(SessionError::Busy);
        }
        self.transcript.clear()?;
        publish(self.updates.as_ref(), &self.transcript);
        Ok(())
    }

    fn record(&mut self, report: &IngestReport) {
        match report.outcome {
            IngestOutcome::Completed => self.stats.completed += 1,
            IngestOutcome::Failed(_) => self.stats.failed += 1,
            IngestOutcome::Cancelled => self.stats.cancelled += 1,
        }
        self.stats.deltas_applied += report.deltas_applied;
        self.stats.records_dropped += report.stats.records_dropped;

        if report.stats.records_dropped > 0 {
            tracing::warn!(
                session = %self.id,
                dropped = report.stats.records_dropped,
                "Malformed records were skipped in this response"
            );
        }
        tracing::info!(
            session = %self.id,
            outcome = ?report.outcome,
            deltas = report.deltas_applied,
            bytes = report.stats.bytes_read,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Response finished"
        );
        self.last_report = Some(report.clone());
    }

    /// Deliver the terminal state even if the channel was full mid-stream
    async fn publish_final(&self) {
        if let Some(ref tx) = self.updates {
            let update = SessionUpdate {
                snapshot: self.transcript.snapshot(),
                streaming: self.transcript.is_streaming(),
            };
            if tx.send(update).await.is_err() {
                tracing::debug!(session = %self.id, "Update receiver dropped");
            }
        }
    }
}

/// Best-effort update; a full channel skips this snapshot
fn publish(updates: Option<&mpsc::Sender<SessionUpdate>>, transcript: &Transcript) {
    let Some(tx) = updates else {
        return;
    };
    let update = SessionUpdate {
        snapshot: transcript.snapshot(),
        streaming: transcript.is_streaming(),
    };
    if let Err(e) = tx.try_send(update) {
        tracing::trace!(error = %e, "Skipped presentation update");
    }
}
