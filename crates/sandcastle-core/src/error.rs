use thiserror::Error;

use crate::encoded::Slot;

/// Errors raised while turning an encoded argument back into a host value.
///
/// These never escape the relay: a failing argument is replaced by an
/// opaque placeholder and its siblings are decoded normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("reference to unknown slot {0}")]
    UnknownSlot(Slot),

    #[error("slot {0} is defined more than once")]
    DuplicateSlot(Slot),

    #[error("malformed record: {0}")]
    Malformed(String),
}

impl DecodeError {
    /// Create a malformed-record error from any displayable cause
    pub fn malformed(cause: impl std::fmt::Display) -> Self {
        Self::Malformed(cause.to_string())
    }
}

/// Core error types for the console bridge model
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown console level: {0}")]
    UnknownLevel(String),
}

impl CoreError {
    /// Create a new UnknownLevel error
    pub fn unknown_level(level: impl Into<String>) -> Self {
        Self::UnknownLevel(level.into())
    }
}
