//! Host side of the bridge.
//!
//! A tokio task that drains the bridge in order, decodes console events and
//! hands them to listeners, and resolves pending execute calls when their
//! completion record arrives.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use sandcastle_core::{ConsoleLevel, ConsoleMessage, CorrelationMeta, DecodedValue, ExecutionId};
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use crate::bridge::{BridgeMessage, BridgeReceiver};
use crate::error::{SandboxError, SandboxResult};

/// Receives `(meta, level, args)` for every delivered console call.
pub type ConsoleListener = dyn Fn(&CorrelationMeta, ConsoleLevel, &[DecodedValue]) + Send + Sync;

/// Receives context-level failures.
pub type ErrorListener = dyn Fn(&SandboxError) + Send + Sync;

#[derive(Default)]
pub(crate) struct Listeners {
    console: RwLock<Vec<Arc<ConsoleListener>>>,
    error: RwLock<Vec<Arc<ErrorListener>>>,
}

impl Listeners {
    pub(crate) fn add_console<F>(&self, listener: F)
    where
        F: Fn(&CorrelationMeta, ConsoleLevel, &[DecodedValue]) + Send + Sync + 'static,
    {
        self.console.write().push(Arc::new(listener));
    }

    pub(crate) fn add_error<F>(&self, listener: F)
    where
        F: Fn(&SandboxError) + Send + Sync + 'static,
    {
        self.error.write().push(Arc::new(listener));
    }

    /// Call console listeners in registration order.
    fn console(&self, message: &ConsoleMessage) {
        // Snapshot so a listener may register further listeners.
        let listeners = self.console.read().clone();
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener(&message.meta, message.level, &message.args)
            }));
            if let Err(panic) = outcome {
                error!(
                    target: "sandcastle",
                    panic = %panic_message(panic.as_ref()),
                    "Console listener panicked"
                );
            }
        }
    }

    pub(crate) fn error(&self, failure: &SandboxError) {
        let listeners = self.error.read().clone();
        if listeners.is_empty() {
            warn!(target: "sandcastle", error = %failure, "Unobserved sandbox error");
        }
        for listener in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(failure))) {
                error!(
                    target: "sandcastle",
                    panic = %panic_message(panic.as_ref()),
                    "Error listener panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

type Completion = oneshot::Sender<SandboxResult<()>>;

/// Execute calls waiting for their completion record.
#[derive(Default)]
pub(crate) struct PendingExecutions {
    inner: Mutex<HashMap<ExecutionId, Completion>>,
}

impl PendingExecutions {
    /// Returns `false` when `execution` is already in flight.
    pub(crate) fn insert(&self, execution: ExecutionId, completion: Completion) -> bool {
        let mut inner = self.inner.lock();
        if inner.contains_key(&execution) {
            return false;
        }
        inner.insert(execution, completion);
        true
    }

    pub(crate) fn remove(&self, execution: &ExecutionId) -> Option<Completion> {
        self.inner.lock().remove(execution)
    }

    fn resolve(&self, execution: &ExecutionId, outcome: SandboxResult<()>) {
        match self.remove(execution) {
            Some(completion) => {
                let _ = completion.send(outcome);
            }
            None => trace!(target: "sandcastle", %execution, "Completion for unknown execution"),
        }
    }

    /// Fail every pending call; returns how many there were.
    pub(crate) fn fail_all(&self, failure: &SandboxError) -> usize {
        let drained: Vec<Completion> = self.inner.lock().drain().map(|(_, c)| c).collect();
        let count = drained.len();
        for completion in drained {
            let _ = completion.send(Err(failure.clone()));
        }
        count
    }
}

pub(crate) struct Relay {
    receiver: BridgeReceiver,
    listeners: Arc<Listeners>,
    pending: Arc<PendingExecutions>,
    disposed: Arc<AtomicBool>,
    debug: bool,
}

impl Relay {
    pub(crate) fn new(
        receiver: BridgeReceiver,
        listeners: Arc<Listeners>,
        pending: Arc<PendingExecutions>,
        disposed: Arc<AtomicBool>,
        debug: bool,
    ) -> Self {
        Self {
            receiver,
            listeners,
            pending,
            disposed,
            debug,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            match message {
                BridgeMessage::Console(raw) => {
                    if self.disposed.load(Ordering::SeqCst) {
                        trace!(target: "sandcastle", "Discarding console event after teardown");
                        continue;
                    }
                    let message = ConsoleMessage::from_raw(raw);
                    if self.debug {
                        debug!(
                            target: "sandcastle",
                            execution = %message.meta.execution,
                            level = %message.level,
                            args = message.args.len(),
                            "Delivering console event"
                        );
                    }
                    self.listeners.console(&message);
                }
                BridgeMessage::Completed { execution, outcome } => {
                    self.pending.resolve(&execution, outcome);
                }
            }
        }

        if !self.disposed.load(Ordering::SeqCst) {
            let failure = SandboxError::ChannelClosed;
            self.listeners.error(&failure);
            self.pending.fail_all(&failure);
        }
        debug!(target: "sandcastle", "Relay stopped");
    }
}
