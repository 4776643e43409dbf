//! Termination signal listener.
//!
//! One background listener per process. It runs the caller's shutdown
//! action and then fires a single-slot notice that the main path can block
//! on or poll.

use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sending half of the notice. Firing more than once is harmless.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownTrigger {
    tx: SyncSender<()>,
}

impl ShutdownTrigger {
    pub(crate) fn fire(&self) {
        // capacity 1: a second fire finds the slot full and is dropped
        let _ = self.tx.try_send(());
    }
}

/// Receiving half: tells the main path that a termination signal arrived.
#[derive(Debug)]
pub struct ShutdownNotice {
    rx: Receiver<()>,
    // keeps the channel open even if the listener could not be installed
    _keepalive: SyncSender<()>,
    received: Cell<bool>,
}

impl ShutdownNotice {
    /// Non-blocking check. Stays true once it has been seen.
    pub fn is_signalled(&self) -> bool {
        if self.received.get() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(()) => {
                self.received.set(true);
                true
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Block until the notice fires.
    pub fn wait(&self) {
        if self.received.get() {
            return;
        }
        if self.rx.recv().is_ok() {
            self.received.set(true);
        }
    }

    /// Block for at most `timeout`. Returns whether the notice fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.received.get() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(()) => {
                self.received.set(true);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

pub(crate) fn notice_pair() -> (ShutdownTrigger, ShutdownNotice) {
    let (tx, rx) = mpsc::sync_channel(1);
    let trigger = ShutdownTrigger { tx: tx.clone() };
    let notice = ShutdownNotice {
        rx,
        _keepalive: tx,
        received: Cell::new(false),
    };
    (trigger, notice)
}

/// Install the process's termination listener.
///
/// `on_signal` runs on the listener thread the first time SIGINT, SIGTERM or
/// SIGHUP arrives; the returned notice fires after it returns. If the
/// listener cannot be installed the failure is logged and the notice simply
/// never fires.
pub(crate) fn install<F>(mut on_signal: F) -> ShutdownNotice
where
    F: FnMut() + Send + 'static,
{
    let (trigger, notice) = notice_pair();
    let mut handled = false;

    let result = ctrlc::set_handler(move || {
        if handled {
            debug!("Ignoring repeated termination signal");
            return;
        }
        handled = true;
        info!("Exit signal received");
        on_signal();
        trigger.fire();
    });

    if let Err(e) = result {
        warn!("Failed to install termination handler: {e}");
    }
    notice
}
