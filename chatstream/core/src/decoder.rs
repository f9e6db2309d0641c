//! Line Decoder
//!
//! Turns arbitrarily sized byte chunks into complete lines and complete lines
//! into [`StreamEvent`]s.
//!
//! Bytes are buffered rather than decoded per chunk: a chunk boundary may fall
//! inside a line, and inside a multi-byte UTF-8 character. Splitting on the
//! `\n` byte is safe because that byte never occurs inside a multi-byte
//! sequence, so each complete line is decoded only once all of its bytes are
//! present.

use crate::protocol::{parse_line, LineOutcome, StreamEvent};

/// Counters describing one decoded response
///
/// Malformed records are tolerated, so these counters are the only record of
/// how much of the stream was thrown away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Bytes received from the transport
    pub bytes_read: u64,
    /// Chunks received from the transport
    pub chunks_read: u64,
    /// Complete lines processed
    pub lines_seen: u64,
    /// Lines without the event marker
    pub lines_ignored: u64,
    /// Records that decoded into an event
    pub records_decoded: u64,
    /// Records carrying the marker that could not be used
    pub records_dropped: u64,
    /// Bytes of an unterminated final line discarded at end of stream
    pub residual_discarded: u64,
}

/// Buffers partial lines across chunks and decodes complete ones
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Residual bytes of an incomplete line
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no `\n`
    scanned: usize,
    stats: DecodeStats,
}

impl LineDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the events of every line it completed
    ///
    /// Events are returned in wire order. Decoding continues past a terminal
    /// event; callers that must stop there do so themselves.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.stats.bytes_read += chunk.len() as u64;
        self.stats.chunks_read += 1;
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            from = start;

            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        events
    }

    /// End of input; discards any unterminated line
    ///
    /// Returns the number of residual bytes dropped.
    pub fn finish(&mut self) -> usize {
        let residual = self.buffer.len();
        if residual > 0 {
            tracing::debug!(bytes = residual, "Discarding unterminated final line");
            self.stats.residual_discarded += residual as u64;
            self.buffer.clear();
        }
        self.scanned = 0;
        residual
    }

    /// Bytes currently waiting for a line terminator
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Decoding counters so far
    #[must_use]
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn decode_line(&mut self, line: &str) -> Option<StreamEvent> {
        self.stats.lines_seen += 1;
        match parse_line(line) {
            LineOutcome::Event(event) => {
                self.stats.records_decoded += 1;
                Some(event)
            }
            LineOutcome::Ignored => {
                self.stats.lines_ignored += 1;
                None
            }
            LineOutcome::Malformed(reason) => {
                self.stats.records_dropped += 1;
                tracing::warn!(
                    reason = %reason,
                    dropped = self.stats.records_dropped,
                    "Dropping malformed stream record"
                );
                None
            }
        }
    }
}
