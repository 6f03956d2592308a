use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SandboxError;

/// Sandbox context configuration.
///
/// Controls engine resource limits and the bridge between the sandbox
/// thread and the host relay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Enable diagnostic instrumentation (per-call timing, per-event
    /// argument counts and wire sizes). Changes nothing else.
    pub debug: bool,

    /// Memory limit in megabytes.
    pub memory_limit_mb: usize,

    /// Stack size limit in kilobytes.
    pub max_stack_size_kb: usize,

    /// Default execution timeout in milliseconds. 0 disables the timeout.
    pub timeout_ms: u64,

    /// Nesting depth past which composites are emitted as placeholders.
    pub max_depth: usize,

    /// Array elements encoded per list; the rest is summarized in one
    /// placeholder item.
    pub max_array_items: usize,

    /// Console events buffered between the sandbox and the relay.
    pub channel_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            debug: false,
            memory_limit_mb: 32,
            max_stack_size_kb: 512,
            timeout_ms: 5000,
            max_depth: 128,
            max_array_items: 100_000,
            channel_capacity: 1024,
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.memory_limit_mb == 0 {
            return Err(SandboxError::Config(
                "memory_limit_mb must be greater than 0".into(),
            ));
        }
        if self.max_stack_size_kb == 0 {
            return Err(SandboxError::Config(
                "max_stack_size_kb must be greater than 0".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(SandboxError::Config("max_depth must be greater than 0".into()));
        }
        if self.max_array_items == 0 {
            return Err(SandboxError::Config(
                "max_array_items must be greater than 0".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(SandboxError::Config(
                "channel_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// The default timeout, `None` when unlimited.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}
