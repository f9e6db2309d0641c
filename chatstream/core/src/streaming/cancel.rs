//! Request cancellation
//!
//! A session owns one [`CancelHandle`]; every request gets its own
//! [`CancellationToken`] so a cancel aimed at one request never leaks into
//! the next.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// Cloneable trigger that aborts the in-flight request of a session
///
/// Triggering it while nothing is streaming has no effect on later requests.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    /// Create an untriggered handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the current request
    pub fn cancel(&self) {
        self.current_token().cancel();
    }

    /// Whether the current request has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.current_token().is_cancelled()
    }

    /// Hand out a fresh token for a new request
    #[must_use]
    pub fn begin_request(&self) -> CancelToken {
        let token = CancellationToken::new();
        *self.lock() = token.clone();
        CancelToken { token }
    }

    fn current_token(&self) -> CancellationToken {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving side of a [`CancelHandle`], scoped to one request
#[derive(Clone, Debug)]
pub struct CancelToken {
    token: CancellationToken,
}

impl CancelToken {
    /// Resolve once this request is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Whether this request has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
