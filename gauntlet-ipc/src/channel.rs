//! Status Channel
//!
//! Cloneable sender handles feeding the single aggregator receiver.
//! Senders never block and never fail: once the aggregator has torn the
//! channel down, further sends are dropped silently so a straggling
//! worker can finish its bucket without a special shutdown path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver};

use crate::events::StatusEvent;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Ask the run to wind down at the next safe point. Safe to call from a
/// signal handler; it only stores a flag.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Whether a shutdown has been requested.
pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

#[cfg(test)]
pub(crate) fn reset_shutdown() {
    SHUTDOWN.store(false, Ordering::SeqCst);
}

/// Create the status channel: many senders, one aggregator receiver.
pub fn status_channel() -> (StatusSender, Receiver<StatusEvent>) {
    let (tx, rx) = unbounded();
    (
        StatusSender {
            tx,
            finished: Arc::new(AtomicBool::new(false)),
        },
        rx,
    )
}

/// Worker-side handle for reporting status events.
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: crossbeam_channel::Sender<StatusEvent>,
    finished: Arc<AtomicBool>,
}

impl StatusSender {
    /// Send one event; dropped silently after teardown.
    pub fn send(&self, event: StatusEvent) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(event);
    }

    /// Announce that dispatch is complete. Idempotent: the first caller
    /// wins and later calls (including from cleanup paths re-running on
    /// interrupt) are no-ops, so the aggregator sees exactly one
    /// `Finished`.
    pub fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(StatusEvent::Finished);
    }
}
