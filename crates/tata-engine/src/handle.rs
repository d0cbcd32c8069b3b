//! Abort control and the processing flag for a session's current turn

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// Turn control shared between a [`ChatSession`](crate::ChatSession) and other tasks.
///
/// Clones observe the same turn; each turn gets its own cancellation token.
#[derive(Clone)]
pub struct SessionHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    is_processing: Arc<AtomicBool>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_processing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark a turn as started and hand out a fresh token for it
    pub(crate) fn start_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        self.is_processing.store(true, Ordering::Release);
        token
    }

    /// Mark the current turn as finished
    pub(crate) fn finish_turn(&self) {
        self.is_processing.store(false, Ordering::Release);
    }

    /// Abort the current turn.
    ///
    /// The read loop stops, the stream is released and the active message ends in
    /// the error state. Does nothing when no turn is running.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Whether a turn is being processed
    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::Acquire)
    }
}
