//! Console events at each stage of the bridge.
//!
//! - [`ConsoleEvent`] is built inside the sandbox thread from encoded args.
//! - [`RawConsoleEvent`] is what crosses the bridge channel.
//! - [`ConsoleMessage`] is what the host relay hands to listeners.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::correlation::CorrelationMeta;
use crate::decode::decode_wire;
use crate::encoded::EncodedValue;
use crate::host::{DecodedValue, ValueView};
use crate::level::ConsoleLevel;

/// A console call as captured by the interceptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleEvent {
    pub correlation: CorrelationMeta,
    pub level: ConsoleLevel,
    pub args: Vec<EncodedValue>,
}

impl ConsoleEvent {
    pub fn new(correlation: CorrelationMeta, level: ConsoleLevel, args: Vec<EncodedValue>) -> Self {
        Self {
            correlation,
            level,
            args,
        }
    }

    /// Render every argument independently for transport.
    pub fn into_raw(self) -> RawConsoleEvent {
        let args = self.args.iter().map(encode_arg).collect();
        RawConsoleEvent {
            correlation: self.correlation,
            level: self.level,
            args,
        }
    }
}

fn encode_arg(arg: &EncodedValue) -> Value {
    serde_json::to_value(arg).unwrap_or_else(|e| {
        json!({ "type": "opaque", "label": format!("[Unserializable: {e}]") })
    })
}

/// The record carried by the bridge channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConsoleEvent {
    pub correlation: CorrelationMeta,
    pub level: ConsoleLevel,
    pub args: Vec<Value>,
}

impl RawConsoleEvent {
    /// Serialized size of the arguments in bytes.
    pub fn wire_size(&self) -> usize {
        self.args.iter().map(|arg| arg.to_string().len()).sum()
    }
}

/// A decoded console call, as delivered to host listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleMessage {
    pub meta: CorrelationMeta,
    pub level: ConsoleLevel,
    pub args: Vec<DecodedValue>,
}

impl ConsoleMessage {
    /// Decode each argument on its own; a bad argument never affects its
    /// siblings.
    pub fn from_raw(raw: RawConsoleEvent) -> Self {
        Self {
            args: raw.args.iter().map(decode_wire).collect(),
            meta: raw.correlation,
            level: raw.level,
        }
    }

    /// Argument `index`, reading `undefined` past the end.
    pub fn arg(&self, index: usize) -> ValueView<'_> {
        self.args
            .get(index)
            .map(DecodedValue::view)
            .unwrap_or_else(|| ValueView::undefined())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{Cursor, ExecutionId};
    use crate::encoded::Slot;

    fn meta() -> CorrelationMeta {
        CorrelationMeta::new(
            ExecutionId::from("exec-1"),
            Some(&Cursor::with_ref("cursor-identifier")),
        )
    }

    #[test]
    fn test_event_survives_the_bridge() {
        let event = ConsoleEvent::new(
            meta(),
            ConsoleLevel::Warn,
            vec![
                EncodedValue::string("hello"),
                EncodedValue::Record {
                    slot: Slot(0),
                    entries: vec![("me".into(), EncodedValue::Reference { slot: Slot(0) })],
                },
            ],
        );

        let raw = event.into_raw();
        assert!(raw.wire_size() > 0);
        let message = ConsoleMessage::from_raw(raw);

        assert_eq!(message.level, ConsoleLevel::Warn);
        assert_eq!(message.meta.reference_str(), Some("cursor-identifier"));
        assert_eq!(message.arg(0).as_str(), Some("hello"));
        let record = message.arg(1);
        assert_eq!(record.get("me").unwrap().object_id(), record.object_id());
    }

    #[test]
    fn test_zero_arguments_read_undefined() {
        let event = ConsoleEvent::new(meta(), ConsoleLevel::Log, vec![]);
        let message = ConsoleMessage::from_raw(event.into_raw());

        assert!(message.args.is_empty());
        assert!(message.arg(0).is_undefined());
    }

    #[test]
    fn test_bad_argument_does_not_poison_siblings() {
        let raw = RawConsoleEvent {
            correlation: meta(),
            level: ConsoleLevel::Info,
            args: vec![
                json!({ "type": "reference", "slot": 4 }),
                json!({ "type": "boolean", "value": true }),
            ],
        };

        let message = ConsoleMessage::from_raw(raw);
        assert!(message.arg(0).as_opaque().unwrap().starts_with("[Undecodable:"));
        assert_eq!(message.arg(1).as_bool(), Some(true));
    }
}
