//! Shutdown signalling.
//!
//! The supervisor owns the only sender; listeners and request tasks hold
//! [`Cancellation`] receivers. A closed channel counts as cancelled, so a
//! dropped supervisor never leaves a task waiting forever.

use std::fmt;
use tokio::sync::watch;

/// Why the server was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested programmatically
    Requested,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Interrupt => f.write_str("interrupt"),
            ShutdownCause::Terminate => f.write_str("terminate"),
            ShutdownCause::Requested => f.write_str("requested"),
        }
    }
}

/// Sending half of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Creates a signal and its first receiver.
    pub fn channel() -> (Self, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, Cancellation { rx })
    }

    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> Cancellation {
        Cancellation {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half of a cancellation signal. Cheap to clone, one per task.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires or its sender is dropped.
    pub async fn cancelled(&mut self) {
        // wait_for errors only when the sender is gone, which also means stop
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}
