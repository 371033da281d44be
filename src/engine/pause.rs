//! Shared pause/cancel primitive reused by the single-story, batch, and parallel
//! executors.
//!
//! The design tolerates a classic missed-wakeup: `resume()` performs a non-blocking
//! send on a zero-capacity rendezvous channel, which is dropped on the floor if no
//! thread is currently parked in `wait_if_paused`. Liveness is restored by a short
//! poll timeout, so a `resume()` that races ahead of a `pause()`-then-wait sequence is
//! never lost for longer than the poll interval.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;
use std::time::Duration;

/// How long `wait_if_paused` parks before re-checking flags.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Flags {
    paused: bool,
    canceled: bool,
}

pub struct PauseController {
    flags: Mutex<Flags>,
    resume_tx: SyncSender<()>,
    resume_rx: Mutex<Receiver<()>>,
}

impl Default for PauseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseController {
    pub fn new() -> Self {
        let (resume_tx, resume_rx) = mpsc::sync_channel(0);
        Self {
            flags: Mutex::new(Flags::default()),
            resume_tx,
            resume_rx: Mutex::new(resume_rx),
        }
    }

    pub fn pause(&self) {
        self.flags.lock().unwrap().paused = true;
    }

    pub fn cancel(&self) {
        self.flags.lock().unwrap().canceled = true;
        // Wake any parked waiter so it observes the cancellation promptly.
        let _ = self.resume_tx.try_send(());
    }

    pub fn resume(&self) {
        self.flags.lock().unwrap().paused = false;
        match self.resume_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {}
        }
    }

    /// Clears both flags. A freshly constructed controller starts clear already; this
    /// exists for the re-run case, where `BatchExecutor::start` and
    /// `ParallelExecutor::start` reset their (possibly shared) controller once at the
    /// top of their own run. `Executor::execute` does NOT call this itself -- a pool's
    /// workers share one controller, and a worker dequeuing its next job must not
    /// clear a `pause()` another worker is still waiting on.
    pub fn reset(&self) {
        let mut flags = self.flags.lock().unwrap();
        flags.paused = false;
        flags.canceled = false;
        // Drain a stale rendezvous signal so a late resume() from a prior run doesn't
        // wake the very first wait_if_paused() of the new run.
        let _ = self.resume_rx.lock().unwrap().try_recv();
    }

    pub fn is_paused(&self) -> bool {
        self.flags.lock().unwrap().paused
    }

    pub fn is_canceled(&self) -> bool {
        self.flags.lock().unwrap().canceled
    }

    /// Blocks the calling thread while paused, returning as soon as either the pause
    /// is lifted or the controller is canceled. Re-checks flags on every wakeup, so a
    /// dropped resume send (see module docs) is never fatal.
    pub fn wait_if_paused(&self) {
        loop {
            {
                let flags = self.flags.lock().unwrap();
                if flags.canceled || !flags.paused {
                    return;
                }
            }
            let rx = self.resume_rx.lock().unwrap();
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}
