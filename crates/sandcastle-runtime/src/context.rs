//! The public sandbox context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use sandcastle_core::{ConsoleLevel, CorrelationMeta, Cursor, DecodedValue, ExecutionId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::bridge::Bridge;
use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::isolate::{self, Command};
use crate::relay::{Listeners, PendingExecutions, Relay};

/// Options for one [`SandboxContext::execute`] call.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Execution id to use instead of a generated one.
    pub id: Option<String>,
    /// Cursor whose `ref` is echoed on every console event of this call.
    pub cursor: Option<Cursor>,
    /// Overrides the configured timeout for this call.
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn with_cursor(reference: impl Into<serde_json::Value>) -> Self {
        Self {
            cursor: Some(Cursor::with_ref(reference)),
            ..Default::default()
        }
    }
}

/// A persistent sandboxed realm with an intercepted console.
///
/// Script state survives across [`execute`](Self::execute) calls. Console
/// calls made by the script reach the listeners registered with
/// [`on_console`](Self::on_console); every console event of a call is
/// delivered before that call's `execute` future resolves.
///
/// ```no_run
/// # async fn demo() -> Result<(), sandcastle_runtime::SandboxError> {
/// use sandcastle_runtime::{ExecuteOptions, SandboxConfig, SandboxContext};
///
/// let context = SandboxContext::create(SandboxConfig::default()).await?;
/// context.on_console(|meta, level, args| {
///     println!("{:?} [{level}] {}", meta.reference, args.len());
/// });
/// context
///     .execute("console.log('hi', { n: NaN })", ExecuteOptions::with_cursor("c-1"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SandboxContext {
    commands: mpsc::UnboundedSender<Command>,
    listeners: Arc<Listeners>,
    pending: Arc<PendingExecutions>,
    disposed: Arc<AtomicBool>,
    config: SandboxConfig,
    worker: Option<JoinHandle<()>>,
}

impl SandboxContext {
    /// Create a context. Must be called within a tokio runtime.
    pub async fn create(config: SandboxConfig) -> SandboxResult<Self> {
        config.validate()?;

        let (bridge, receiver) = Bridge::channel(config.channel_capacity);
        let (commands, command_receiver) = mpsc::unbounded_channel();
        let (ready, ready_receiver) = oneshot::channel();
        let disposed = Arc::new(AtomicBool::new(false));

        let worker = isolate::spawn(
            config.clone(),
            bridge,
            command_receiver,
            disposed.clone(),
            ready,
        )?;
        ready_receiver
            .await
            .map_err(|_| SandboxError::creation("isolate thread exited during setup"))??;

        let listeners = Arc::new(Listeners::default());
        let pending = Arc::new(PendingExecutions::default());
        let relay = Relay::new(
            receiver,
            listeners.clone(),
            pending.clone(),
            disposed.clone(),
            config.debug,
        );
        tokio::spawn(relay.run());

        Ok(Self {
            commands,
            listeners,
            pending,
            disposed,
            config,
            worker: Some(worker),
        })
    }

    /// Register a console listener. Listeners run in registration order on
    /// the relay task; a panicking listener is logged and skipped.
    pub fn on_console<F>(&self, listener: F)
    where
        F: Fn(&CorrelationMeta, ConsoleLevel, &[DecodedValue]) + Send + Sync + 'static,
    {
        self.listeners.add_console(listener);
    }

    /// Register a listener for context-level failures: a broken bridge, a
    /// crashed isolate, or a teardown that interrupted in-flight work.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&SandboxError) + Send + Sync + 'static,
    {
        self.listeners.add_error(listener);
    }

    /// Run `code` in the persistent realm.
    ///
    /// Resolves with the execution id once the script and its pending jobs
    /// have finished, after all of its console events were delivered.
    pub async fn execute(
        &self,
        code: impl Into<String>,
        options: ExecuteOptions,
    ) -> SandboxResult<ExecutionId> {
        if self.is_disposed() {
            return Err(SandboxError::Disposed);
        }

        let execution = options
            .id
            .map(ExecutionId::from)
            .unwrap_or_else(ExecutionId::generate);
        let meta = CorrelationMeta::new(execution.clone(), options.cursor.as_ref());
        let timeout = options.timeout.or_else(|| self.config.timeout());

        let (completion, outcome) = oneshot::channel();
        if !self.pending.insert(execution.clone(), completion) {
            return Err(SandboxError::DuplicateExecution(execution));
        }

        let command = Command::Execute {
            meta,
            code: code.into(),
            timeout,
        };
        if self.commands.send(command).is_err() {
            self.pending.remove(&execution);
            return Err(self.closed_error());
        }

        match outcome.await {
            Ok(result) => result.map(|()| execution),
            Err(_) => Err(self.closed_error()),
        }
    }

    /// Tear the context down.
    ///
    /// Interrupts a running script, discards undelivered console events and
    /// fails pending executions with [`SandboxError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.commands.send(Command::Shutdown);

        let failure = SandboxError::Disposed;
        let interrupted = self.pending.fail_all(&failure);
        if interrupted > 0 {
            self.listeners.error(&failure);
        }
        info!(target: "sandcastle", interrupted, "Sandbox context disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn closed_error(&self) -> SandboxError {
        if self.is_disposed() {
            SandboxError::Disposed
        } else {
            SandboxError::ChannelClosed
        }
    }
}

impl Drop for SandboxContext {
    fn drop(&mut self) {
        self.dispose();
        // The isolate stops on its own once interrupted; never block here.
        if let Some(worker) = self.worker.take() {
            debug!(
                target: "sandcastle",
                finished = worker.is_finished(),
                "Detaching isolate thread"
            );
        }
    }
}
