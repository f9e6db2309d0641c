//! Transcript Store
//!
//! Holds the ordered turns of one conversation and the mutation operations the
//! submission path and the stream ingestor use to grow it.
//!
//! # Invariants
//!
//! - Insertion order is conversation order; it is also the order in which the
//!   history is sent back to the server.
//! - At most one turn is open at a time. The open turn is named by an explicit
//!   [`TurnHandle`] rather than by re-deriving a position, so a handle that
//!   outlived its request is rejected instead of writing into the wrong turn.
//! - A turn's role never changes. Its content only grows while it is open and
//!   is frozen once it closes, except for the single replacement allowed by
//!   [`Transcript::close_turn`].

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{TurnId, TurnRole, TurnState};
use crate::protocol::HistoryEntry;

/// Contract violations on the transcript
///
/// These indicate a caller bug (a second open turn, a stale handle), not a
/// condition to report to the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    /// Another turn is still receiving deltas
    #[error("turn {open} is still open")]
    TurnAlreadyOpen {
        /// The turn that is open
        open: TurnId,
    },

    /// No turn exists at the handle's position
    #[error("no turn at position {position}")]
    UnknownTurn {
        /// Position that was looked up
        position: usize,
    },

    /// The handle no longer names the open turn
    #[error("handle for {id} does not name the open turn")]
    StaleHandle {
        /// Turn the handle was issued for
        id: TurnId,
    },

    /// The turn was already closed
    #[error("turn {id} is closed")]
    TurnClosed {
        /// The closed turn
        id: TurnId,
    },
}

/// One contribution to the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    id: TurnId,
    role: TurnRole,
    content: String,
    created_at: DateTime<Utc>,
    state: TurnState,
}

impl Turn {
    fn closed(role: TurnRole, content: String) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content,
            created_at: Utc::now(),
            state: TurnState::Closed,
        }
    }

    fn open(role: TurnRole) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content: String::new(),
            created_at: Utc::now(),
            state: TurnState::Open,
        }
    }

    /// Unique turn ID
    #[must_use]
    pub fn id(&self) -> &TurnId {
        &self.id
    }

    /// Who authored this turn
    #[must_use]
    pub fn role(&self) -> TurnRole {
        self.role
    }

    /// Current content
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Creation time
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Open or closed
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether the turn still accepts deltas
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == TurnState::Open
    }
}

/// Token naming the open assistant turn
///
/// Returned by [`Transcript::append_open_assistant_turn`] and threaded through
/// the ingestor. Carries both the position and the turn ID so a lookup can
/// confirm it still refers to the same turn.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TurnHandle {
    position: usize,
    id: TurnId,
}

impl TurnHandle {
    /// Position of the turn in the transcript
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// ID of the turn
    #[must_use]
    pub fn id(&self) -> &TurnId {
        &self.id
    }
}

/// Immutable ordered copy of the transcript
///
/// Cloning is cheap; the turns are shared.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptSnapshot {
    turns: Arc<[Turn]>,
}

impl TranscriptSnapshot {
    /// All turns in conversation order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Role/content pairs for every closed turn
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.turns
            .iter()
            .filter(|t| !t.is_open())
            .map(|t| HistoryEntry::new(t.role, t.content.clone()))
            .collect()
    }
}

impl Deref for TranscriptSnapshot {
    type Target = [Turn];

    fn deref(&self) -> &Self::Target {
        &self.turns
    }
}

/// Ordered sequence of conversation turns
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    open: Option<TurnHandle>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closed user turn
    ///
    /// # Errors
    ///
    /// Fails with [`TranscriptError::TurnAlreadyOpen`] while an assistant turn
    /// is still streaming.
    pub fn append_user_turn(
        &mut self,
        text: impl Into<String>,
    ) -> Result<TurnHandle, TranscriptError> {
        self.ensure_nothing_open()?;
        Ok(self.push(Turn::closed(TurnRole::User, text.into())))
    }

    /// Append an empty assistant turn marked open
    ///
    /// # Errors
    ///
    /// Fails with [`TranscriptError::TurnAlreadyOpen`] if another turn is
    /// open. Two open turns are never created.
    pub fn append_open_assistant_turn(&mut self) -> Result<TurnHandle, TranscriptError> {
        self.ensure_nothing_open()?;
        let handle = self.push(Turn::open(TurnRole::Assistant));
        self.open = Some(handle.clone());
        tracing::trace!(turn = %handle.id, position = handle.position, "Opened assistant turn");
        Ok(handle)
    }

    /// Append a user turn and its open assistant placeholder together
    ///
    /// Either both turns are appended or neither is.
    ///
    /// # Errors
    ///
    /// Fails with [`TranscriptError::TurnAlreadyOpen`] if a turn is open.
    pub fn begin_exchange(
        &mut self,
        text: impl Into<String>,
    ) -> Result<(TurnHandle, TurnHandle), TranscriptError> {
        self.ensure_nothing_open()?;
        let user = self.append_user_turn(text)?;
        let assistant = self.append_open_assistant_turn()?;
        Ok((user, assistant))
    }

    /// Concatenate `text` onto the open turn
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale or the turn is already closed.
    pub fn append_delta(&mut self, handle: &TurnHandle, text: &str) -> Result<(), TranscriptError> {
        let position = self.resolve_open(handle)?;
        self.turns[position].content.push_str(text);
        Ok(())
    }

    /// Close the open turn
    ///
    /// With `Some(final_text)` the accumulated content is replaced, which is
    /// how an error apology overwrites a partial answer. With `None` the
    /// content is kept as accumulated.
    ///
    /// # Errors
    ///
    /// Fails if the handle is stale or the turn is already closed.
    pub fn close_turn(
        &mut self,
        handle: &TurnHandle,
        final_text: Option<String>,
    ) -> Result<(), TranscriptError> {
        let position = self.resolve_open(handle)?;
        let turn = &mut self.turns[position];
        if let Some(text) = final_text {
            turn.content = text;
        }
        turn.state = TurnState::Closed;
        self.open = None;
        tracing::trace!(turn = %handle.id, bytes = turn.content.len(), "Closed turn");
        Ok(())
    }

    /// Whether `handle` still names the open turn
    #[must_use]
    pub fn is_current(&self, handle: &TurnHandle) -> bool {
        self.resolve_open(handle).is_ok()
    }

    /// Immutable ordered copy of all turns
    #[must_use]
    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            turns: self.turns.clone().into(),
        }
    }

    /// Closed turns as role/content pairs, bounded to the last `max_turns`
    /// (0 = unlimited)
    #[must_use]
    pub fn history(&self, max_turns: usize) -> Vec<HistoryEntry> {
        let closed: Vec<&Turn> = self.turns.iter().filter(|t| !t.is_open()).collect();
        let start = if max_turns == 0 {
            0
        } else {
            closed.len().saturating_sub(max_turns)
        };
        closed[start..]
            .iter()
            .map(|t| HistoryEntry::new(t.role, t.content.clone()))
            .collect()
    }

    /// Handle of the open turn, if any
    #[must_use]
    pub fn open_turn(&self) -> Option<&TurnHandle> {
        self.open.as_ref()
    }

    /// Whether a turn is currently receiving deltas
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.open.is_some()
    }

    /// Turn at `position`
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Turn> {
        self.turns.get(position)
    }

    /// Turn named by `handle`
    #[must_use]
    pub fn turn(&self, handle: &TurnHandle) -> Option<&Turn> {
        self.turns
            .get(handle.position)
            .filter(|t| t.id == handle.id)
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether there are no turns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop all turns
    ///
    /// # Errors
    ///
    /// Refused while a turn is open.
    pub fn clear(&mut self) -> Result<(), TranscriptError> {
        self.ensure_nothing_open()?;
        self.turns.clear();
        Ok(())
    }

    fn push(&mut self, turn: Turn) -> TurnHandle {
        let handle = TurnHandle {
            position: self.turns.len(),
            id: turn.id.clone(),
        };
        self.turns.push(turn);
        handle
    }

    fn ensure_nothing_open(&self) -> Result<(), TranscriptError> {
        match self.open {
            Some(ref open) => Err(TranscriptError::TurnAlreadyOpen {
                open: open.id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn resolve_open(&self, handle: &TurnHandle) -> Result<usize, TranscriptError> {
        let turn = self
            .turns
            .get(handle.position)
            .ok_or(TranscriptError::UnknownTurn {
                position: handle.position,
            })?;

        if turn.id != handle.id {
            return Err(TranscriptError::StaleHandle {
                id: handle.id.clone(),
            });
        }
        if !turn.is_open() {
            return Err(TranscriptError::TurnClosed {
                id: handle.id.clone(),
            });
        }
        if self.open.as_ref() != Some(handle) {
            return Err(TranscriptError::StaleHandle {
                id: handle.id.clone(),
            });
        }
        Ok(handle.position)
    }
}
