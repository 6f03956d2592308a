//! Console interception inside the sandbox.
//!
//! The prelude installs `globalThis.console` and calls back into the native
//! `emit` function defined here with `(level, inspector, ...args)`. `emit`
//! snapshots every argument synchronously, stamps the event with the
//! correlation of the in-flight execute call and pushes it onto the bridge.

use std::sync::Arc;

use parking_lot::Mutex;
use rquickjs::function::Rest;
use rquickjs::{Ctx, FromJs, Function, Value};
use sandcastle_core::{ConsoleEvent, ConsoleLevel, CorrelationMeta, EncodedValue};
use tracing::{debug, warn};

use crate::bridge::{Bridge, BridgeMessage};
use crate::config::SandboxConfig;
use crate::serializer::{SerializationContext, encode};
use crate::watchdog::Watchdog;

const PRELUDE: &str = include_str!("prelude.js");

/// Shared between the isolate and the native `emit` closure.
pub(crate) struct InterceptorState {
    bridge: Arc<Bridge>,
    watchdog: Arc<Watchdog>,
    correlation: Mutex<Option<CorrelationMeta>>,
    max_depth: usize,
    max_array_items: usize,
    debug: bool,
}

impl InterceptorState {
    pub(crate) fn new(bridge: Arc<Bridge>, watchdog: Arc<Watchdog>, config: &SandboxConfig) -> Self {
        Self {
            bridge,
            watchdog,
            correlation: Mutex::new(None),
            max_depth: config.max_depth,
            max_array_items: config.max_array_items,
            debug: config.debug,
        }
    }

    pub(crate) fn begin(&self, meta: CorrelationMeta) {
        *self.correlation.lock() = Some(meta);
    }

    pub(crate) fn end(&self) {
        *self.correlation.lock() = None;
    }

    /// Errors only when the call was interrupted; the pending engine
    /// exception, if any, is left in place so the script stops.
    fn emit<'js>(
        &self,
        ctx: &Ctx<'js>,
        level: &str,
        inspector: Function<'js>,
        args: Vec<Value<'js>>,
    ) -> rquickjs::Result<()> {
        let level = match level.parse::<ConsoleLevel>() {
            Ok(level) => level,
            Err(e) => {
                warn!(target: "sandcastle", error = %e, "Ignoring console call");
                return Ok(());
            }
        };
        if self.bridge.is_broken() {
            return Ok(());
        }
        // The engine may not have polled the interrupt yet; nothing more is
        // reported for a call that is being stopped.
        if self.watchdog.should_stop() {
            return Ok(());
        }
        let Some(correlation) = self.correlation.lock().clone() else {
            warn!(target: "sandcastle", %level, "Console call outside of an execution, dropping");
            return Ok(());
        };

        let mut encoded = Vec::with_capacity(args.len());
        for arg in &args {
            let mut sc = SerializationContext::new(
                inspector.clone(),
                self.watchdog.clone(),
                self.max_depth,
                self.max_array_items,
            );
            match encode(ctx, arg, &mut sc) {
                Ok(value) => encoded.push(value),
                Err(e) if self.watchdog.is_interrupted() => {
                    debug!(target: "sandcastle", %level, "Console call interrupted, dropping");
                    return if e.is_exception() { Err(e) } else { Ok(()) };
                }
                Err(e) => encoded.push(EncodedValue::unserializable(failure_reason(ctx, e))),
            }
        }

        let event = ConsoleEvent::new(correlation, level, encoded).into_raw();
        if self.debug {
            debug!(
                target: "sandcastle",
                execution = %event.correlation.execution,
                %level,
                args = event.args.len(),
                wire_size = event.wire_size(),
                "Console event captured"
            );
        }

        // A broken bridge is surfaced by the relay; nothing to do here.
        let _ = self.bridge.send(BridgeMessage::Console(event));
        Ok(())
    }
}

/// Evaluate the prelude and hand it the native `emit` function.
pub(crate) fn install<'js>(ctx: &Ctx<'js>, state: Arc<InterceptorState>) -> rquickjs::Result<()> {
    let installer: Function<'js> = ctx.eval(PRELUDE)?;

    let emit = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, level: String, inspector: Function<'js>, args: Rest<Value<'js>>| {
            state.emit(&ctx, &level, inspector, args.0)
        },
    )?;

    installer.call::<_, ()>((emit,))?;
    Ok(())
}

/// Describe a failed engine call and clear its pending exception.
pub(crate) fn failure_reason(ctx: &Ctx<'_>, error: rquickjs::Error) -> String {
    if !matches!(error, rquickjs::Error::Exception) {
        return error.to_string();
    }
    let caught = ctx.catch();
    if let Some(exception) = caught.as_exception() {
        return exception
            .message()
            .unwrap_or_else(|| "exception without message".to_string());
    }
    match rquickjs::convert::Coerced::<String>::from_js(ctx, caught) {
        Ok(text) => text.0,
        Err(_) => {
            let _ = ctx.catch();
            "uncaught exception".to_string()
        }
    }
}
