//! Process-wide shutdown signal and per-request cancellation tokens

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::info;

/// Single-set, never-reset shutdown signal shared by every component
#[derive(Clone)]
pub struct ShutdownSignal {
    /// Signal sender
    tx: Arc<watch::Sender<bool>>,
    /// Signal receiver template
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Create a new, untriggered signal
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);

        Self { tx: Arc::new(tx), rx }
    }

    /// Raise the signal. Later calls are no-ops.
    pub fn trigger(&self, reason: &str) {
        let newly_set = self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        });

        if newly_set {
            info!("Shutdown requested: {}", reason);
        }
    }

    /// Check whether shutdown was requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of this signal, so an error
        // here can only mean the process is tearing down.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Create a cancellation token tied to this signal
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            shutdown: self.rx.clone(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative cancellation for blocking workers.
///
/// A token is cancelled when the process-wide shutdown signal fires or when
/// the owner cancels this particular request. Workers poll it between reads.
#[derive(Clone)]
pub struct CancelToken {
    shutdown: watch::Receiver<bool>,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that is only cancelled explicitly
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);

        Self {
            shutdown: rx,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the request this token belongs to
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether the worker should stop
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || *self.shutdown.borrow()
    }
}
