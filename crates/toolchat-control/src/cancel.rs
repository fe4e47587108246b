//! Cancellation controller.
//!
//! Holds the token of the in-flight model request. Starting a request
//! cancels whatever was in flight before, so at most one stream writes to
//! the transcript at a time. Clones share the same slot, which lets a signal
//! handler cancel a request owned by the session.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Shared handle to the in-flight request's cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Canceller {
    /// Create a controller with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any prior request and install a fresh token for a new one.
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.current.lock().replace(token.clone());
        if let Some(previous) = previous {
            if !previous.is_cancelled() {
                tracing::debug!("Aborting previous in-flight request");
                previous.cancel();
            }
        }
        token
    }

    /// Cancel the in-flight request, if any.
    ///
    /// Returns true if a request was signalled.
    pub fn cancel(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Clear the slot once the request has finished.
    pub fn finish(&self) {
        self.current.lock().take();
    }

    /// Returns true if a request is registered and not cancelled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }
}
