//! The engine thread.
//!
//! A QuickJS runtime is not `Send`, so each sandbox context owns one
//! dedicated OS thread that creates the runtime, installs the console and
//! then serves execute commands one at a time. Results go back over the
//! bridge behind any console events the call produced.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rquickjs::context::EvalOptions;
use rquickjs::{Context, Ctx, Runtime, Value};
use sandcastle_core::CorrelationMeta;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, BridgeMessage};
use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::interceptor::{self, InterceptorState, failure_reason};
use crate::watchdog::Watchdog;

/// Native stack for the engine thread. Leaves headroom above the engine's
/// own stack limit for the serializer's recursion.
const ISOLATE_STACK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub(crate) enum Command {
    Execute {
        meta: CorrelationMeta,
        code: String,
        timeout: Option<Duration>,
    },
    Shutdown,
}

/// Start the engine thread and report setup success through `ready`.
pub(crate) fn spawn(
    config: SandboxConfig,
    bridge: Bridge,
    commands: mpsc::UnboundedReceiver<Command>,
    disposed: Arc<AtomicBool>,
    ready: oneshot::Sender<SandboxResult<()>>,
) -> SandboxResult<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("sandcastle-isolate".to_string())
        .stack_size(ISOLATE_STACK_SIZE)
        .spawn(move || match Isolate::new(&config, bridge, disposed) {
            Ok(isolate) => {
                let _ = ready.send(Ok(()));
                isolate.run(commands);
            }
            Err(e) => {
                let _ = ready.send(Err(e));
            }
        })
        .map_err(SandboxError::creation)
}

/// Why a script stopped before completing normally.
struct ScriptFailure {
    message: String,
    stack: Option<String>,
}

impl ScriptFailure {
    fn interrupted() -> Self {
        Self {
            message: "interrupted".to_string(),
            stack: None,
        }
    }

    fn from_engine(ctx: &Ctx<'_>, error: rquickjs::Error) -> Self {
        if matches!(error, rquickjs::Error::Exception) {
            let caught = ctx.catch();
            if let Some(exception) = caught.as_exception() {
                return Self {
                    message: exception
                        .message()
                        .unwrap_or_else(|| "Uncaught exception".to_string()),
                    stack: exception.stack().filter(|s| !s.is_empty()),
                };
            }
            // Not an Error instance; put the value back so it can be described.
            let _ = ctx.throw(caught);
        }
        Self {
            message: failure_reason(ctx, error),
            stack: None,
        }
    }
}

/// Untrusted code runs as a classic script: sloppy mode, global scope.
fn sloppy_script() -> EvalOptions {
    let mut options = EvalOptions::default();
    options.strict = false;
    options
}

struct Isolate {
    runtime: Runtime,
    context: Context,
    interceptor: Arc<InterceptorState>,
    bridge: Arc<Bridge>,
    watchdog: Arc<Watchdog>,
    debug: bool,
}

impl Isolate {
    fn new(config: &SandboxConfig, bridge: Bridge, disposed: Arc<AtomicBool>) -> SandboxResult<Self> {
        let runtime = Runtime::new().map_err(SandboxError::creation)?;
        runtime.set_memory_limit(config.memory_limit_mb * 1024 * 1024);
        runtime.set_max_stack_size(config.max_stack_size_kb * 1024);

        let watchdog = Arc::new(Watchdog::new(disposed));
        {
            let watchdog = watchdog.clone();
            runtime.set_interrupt_handler(Some(Box::new(move || watchdog.should_stop())));
        }

        let context = Context::full(&runtime).map_err(SandboxError::creation)?;

        let bridge = Arc::new(bridge);
        let interceptor = Arc::new(InterceptorState::new(
            bridge.clone(),
            watchdog.clone(),
            config,
        ));
        context
            .with(|ctx| {
                interceptor::install(&ctx, interceptor.clone())
                    .map_err(|e| failure_reason(&ctx, e))
            })
            .map_err(SandboxError::ContextCreation)?;

        info!(
            target: "sandcastle",
            memory_limit_mb = config.memory_limit_mb,
            max_stack_size_kb = config.max_stack_size_kb,
            "Sandbox context created"
        );

        Ok(Self {
            runtime,
            context,
            interceptor,
            bridge,
            watchdog,
            debug: config.debug,
        })
    }

    fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.blocking_recv() {
            match command {
                Command::Execute {
                    meta,
                    code,
                    timeout,
                } => {
                    let execution = meta.execution.clone();
                    let outcome = self.execute(meta, &code, timeout);
                    let completed = BridgeMessage::Completed { execution, outcome };
                    if self.bridge.send(completed).is_err() {
                        break;
                    }
                }
                Command::Shutdown => break,
            }
        }
        debug!(target: "sandcastle", "Isolate thread stopped");
    }

    fn execute(
        &self,
        meta: CorrelationMeta,
        code: &str,
        timeout: Option<Duration>,
    ) -> SandboxResult<()> {
        if self.watchdog.is_disposed() {
            return Err(SandboxError::Disposed);
        }

        let execution = meta.execution.clone();
        let started = Instant::now();
        self.watchdog.arm(timeout);
        self.interceptor.begin(meta);

        let mut result = self.context.with(|ctx| {
            ctx.eval_with_options::<Value, _>(code, sloppy_script())
                .map(|_| ())
                .map_err(|e| ScriptFailure::from_engine(&ctx, e))
        });
        if result.is_ok() {
            result = self.drain_jobs();
        }
        // A console call may notice the deadline and return normally.
        if result.is_ok() && self.watchdog.is_interrupted() {
            result = Err(ScriptFailure::interrupted());
        }

        self.interceptor.end();
        self.watchdog.disarm();

        let outcome = result.map_err(|failure| {
            if self.watchdog.is_interrupted() {
                if self.watchdog.is_disposed() {
                    SandboxError::Disposed
                } else {
                    SandboxError::Timeout {
                        execution: execution.clone(),
                        timeout_ms: timeout.map_or(0, |t| t.as_millis() as u64),
                    }
                }
            } else {
                SandboxError::script(execution.clone(), failure.message, failure.stack)
            }
        });

        if self.debug {
            debug!(
                target: "sandcastle",
                execution = %execution,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "Execution finished"
            );
        }
        outcome
    }

    /// Run queued promise jobs so async console calls belong to this call.
    fn drain_jobs(&self) -> Result<(), ScriptFailure> {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(_) if self.watchdog.is_interrupted() => {
                    return Err(ScriptFailure::interrupted());
                }
                Err(_) => {
                    warn!(target: "sandcastle", "Pending job raised an exception");
                }
            }
        }
    }
}
