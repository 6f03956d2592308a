//! sandcastle-runtime - QuickJS sandbox with a console bridge to the host
//!
//! Untrusted script runs in a QuickJS context on a dedicated thread. Its
//! `console` is replaced by an interceptor that snapshots every argument
//! into the tagged encoding of `sandcastle-core` at the call site; the
//! encoded events cross an ordered channel and are decoded by a relay task
//! into host values for registered listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────── isolate thread ────────────────┐
//! │ Runtime + Context                               │
//! │   console.* (prelude) → emit → serializer       │
//! │   execute → Completed{outcome}                  │
//! └──────────────────────┬──────────────────────────┘
//!                        │ Bridge (bounded, ordered)
//!                        ▼
//! ┌──────────────── relay task (tokio) ────────────┐
//! │ decode → console listeners                      │
//! │ Completed → resolves execute()                  │
//! └─────────────────────────────────────────────────┘
//! ```

mod bridge;
pub mod config;
pub mod context;
pub mod error;
mod interceptor;
mod isolate;
mod relay;
mod serializer;
mod watchdog;

pub use config::SandboxConfig;
pub use context::{ExecuteOptions, SandboxContext};
pub use error::{SandboxError, SandboxResult};
pub use relay::{ConsoleListener, ErrorListener};

pub use sandcastle_core as core;
