//! Per-call correlation metadata.
//!
//! Every console event produced while one `execute` call is in flight carries
//! the same [`CorrelationMeta`]: the caller's cursor token, echoed verbatim,
//! and the identifier of the execute invocation itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies one execute invocation. Distinct from the caller's cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExecutionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ExecutionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied cursor for one execute call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// Opaque token; never interpreted, only echoed as `meta.ref`.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Value>,
}

impl Cursor {
    pub fn with_ref(reference: impl Into<Value>) -> Self {
        Self {
            reference: Some(reference.into()),
        }
    }
}

/// Metadata attached to every console event of one execute call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMeta {
    #[serde(rename = "ref")]
    pub reference: Option<Value>,
    pub execution: ExecutionId,
}

impl CorrelationMeta {
    pub fn new(execution: ExecutionId, cursor: Option<&Cursor>) -> Self {
        Self {
            reference: cursor.and_then(|c| c.reference.clone()),
            execution,
        }
    }

    /// The cursor token when it is a plain string.
    pub fn reference_str(&self) -> Option<&str> {
        self.reference.as_ref().and_then(Value::as_str)
    }
}
