//! Error types for sandcastle-runtime

use sandcastle_core::ExecutionId;
use thiserror::Error;

/// Context-level failures of a sandbox.
///
/// Per-value problems never show up here; they are reported in-band as
/// placeholder values. `Clone` so one failure can be handed to every error
/// listener.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// Failed to create the engine runtime or install the console
    #[error("Failed to create sandbox context: {0}")]
    ContextCreation(String),

    /// The executed script threw
    #[error("Script error in execution {execution}: {message}")]
    Script {
        execution: ExecutionId,
        message: String,
        stack: Option<String>,
    },

    /// The executed script ran past its deadline
    #[error("Execution {execution} timed out after {timeout_ms}ms")]
    Timeout {
        execution: ExecutionId,
        timeout_ms: u64,
    },

    /// A caller-supplied execution id is already in flight
    #[error("Execution {0} is already in flight")]
    DuplicateExecution(ExecutionId),

    /// The context was torn down
    #[error("Sandbox context has been disposed")]
    Disposed,

    /// The bridge between sandbox and host broke
    #[error("Bridge channel closed unexpectedly")]
    ChannelClosed,

    /// Invalid configuration
    #[error("Invalid sandbox configuration: {0}")]
    Config(String),
}

impl SandboxError {
    /// Create a script error from an exception message
    pub fn script(
        execution: ExecutionId,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> Self {
        Self::Script {
            execution,
            message: message.into(),
            stack,
        }
    }

    /// Create a context creation error
    pub fn creation(cause: impl std::fmt::Display) -> Self {
        Self::ContextCreation(cause.to_string())
    }
}

/// Result type alias for sandbox operations
pub type SandboxResult<T> = Result<T, SandboxError>;
