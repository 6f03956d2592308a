//! Ordered channel from the isolate thread to the host relay.
//!
//! Console events and execution outcomes share one channel, so every event
//! of a call is dispatched before that call's outcome.

use std::sync::atomic::{AtomicBool, Ordering};

use sandcastle_core::{ExecutionId, RawConsoleEvent};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{SandboxError, SandboxResult};

#[derive(Debug)]
pub(crate) enum BridgeMessage {
    Console(RawConsoleEvent),
    Completed {
        execution: ExecutionId,
        outcome: SandboxResult<()>,
    },
}

pub(crate) type BridgeReceiver = mpsc::Receiver<BridgeMessage>;

/// Sending half, used only from the isolate thread.
pub(crate) struct Bridge {
    sender: mpsc::Sender<BridgeMessage>,
    broken: AtomicBool,
}

impl Bridge {
    pub(crate) fn channel(capacity: usize) -> (Self, BridgeReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        let bridge = Self {
            sender,
            broken: AtomicBool::new(false),
        };
        (bridge, receiver)
    }

    /// Blocks while the channel is full.
    pub(crate) fn send(&self, message: BridgeMessage) -> SandboxResult<()> {
        if self.sender.blocking_send(message).is_err() {
            if !self.broken.swap(true, Ordering::SeqCst) {
                warn!(target: "sandcastle", "Bridge receiver is gone, dropping messages");
            }
            return Err(SandboxError::ChannelClosed);
        }
        Ok(())
    }

    pub(crate) fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }
}
