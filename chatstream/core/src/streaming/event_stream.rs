//! Pull-based event stream over a chunked response body

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::{Stream, StreamExt};

use crate::backend::TransportError;
use crate::decoder::{DecodeStats, LineDecoder};
use crate::protocol::StreamEvent;

/// Decoded [`StreamEvent`]s from a stream of byte chunks
///
/// Chunk boundaries are invisible to consumers: a line split across any
/// number of chunks is yielded once, after its terminator arrives. After a
/// terminal event (complete or failed) or a transport error the stream ends.
/// End of the underlying body without a terminal event simply ends the
/// stream; the caller decides what that means.
pub struct EventStream<S> {
    inner: S,
    decoder: LineDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S> EventStream<S>
where
    S: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin,
{
    /// Wrap a chunked body
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Decoding counters so far
    #[must_use]
    pub fn stats(&self) -> DecodeStats {
        self.decoder.stats()
    }

    /// Whether the stream will yield nothing more
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished && self.pending.is_empty()
    }
}

impl<S> Stream for EventStream<S>
where
    S: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin,
{
    type Item = Result<StreamEvent, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(event) = this.pending.pop_front() {
                if event.is_terminal() {
                    // Lines after a terminal record are never applied
                    this.finished = true;
                    this.pending.clear();
                }
                return Poll::Ready(Some(Ok(event)));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    let events = this.decoder.push(&chunk);
                    this.pending.extend(events);
                }
                Some(Err(e)) => {
                    this.finished = true;
                    this.decoder.finish();
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.finished = true;
                    this.decoder.finish();
                }
            }
        }
    }
}
