//! Deadline and teardown checks for running script.
//!
//! Consulted by the engine's interrupt handler while bytecode runs and by
//! the serializer while it walks values natively, where the engine never
//! polls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub(crate) struct Watchdog {
    deadline: Mutex<Option<Instant>>,
    disposed: Arc<AtomicBool>,
    interrupted: AtomicBool,
}

impl Watchdog {
    pub(crate) fn new(disposed: Arc<AtomicBool>) -> Self {
        Self {
            deadline: Mutex::new(None),
            disposed,
            interrupted: AtomicBool::new(false),
        }
    }

    /// Start watching one execute call.
    pub(crate) fn arm(&self, timeout: Option<Duration>) {
        self.interrupted.store(false, Ordering::SeqCst);
        *self.deadline.lock() = timeout.map(|t| Instant::now() + t);
    }

    /// Stop the deadline; a latched interruption stays visible.
    pub(crate) fn disarm(&self) {
        *self.deadline.lock() = None;
    }

    /// Whether running work must stop now. Latches the interruption.
    pub(crate) fn should_stop(&self) -> bool {
        let expired = self.deadline.lock().is_some_and(|at| Instant::now() >= at);
        let stop = expired || self.is_disposed();
        if stop {
            self.interrupted.store(true, Ordering::SeqCst);
        }
        stop
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
