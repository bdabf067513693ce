//! Cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use smol::channel::{Receiver, Sender};

/// Cancellation token shared by everything one owner starts
///
/// Cancelling is permanent. Work checks [`CancelToken::is_cancelled`] before
/// mutating state and races [`CancelToken::cancelled`] against its
/// suspension points.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    // Never carries a message; closing it wakes every waiter.
    signal: Sender<()>,
    wait: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (signal, wait) = smol::channel::bounded(1);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                signal,
                wait,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.signal.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        // recv only returns once the channel is closed
        let _ = self.inner.wait.recv().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
