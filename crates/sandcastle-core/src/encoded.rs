//! Tagged, cycle-safe encoding of one logged argument.
//!
//! The sandbox side produces one [`EncodedValue`] tree per top-level argument.
//! Every object-kind node records the [`Slot`] it was registered under in
//! that argument's identity table; a later visit of the same source object
//! is emitted as [`EncodedValue::Reference`] instead of being walked again.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Index into the per-argument identity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u32);

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A number that keeps NaN and the signed infinities as explicit sentinels.
///
/// Serialized as a plain JSON number when finite, otherwise as one of the
/// strings `"NaN"`, `"Infinity"`, `"-Infinity"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberLiteral {
    /// Never holds a non-finite value; use [`NumberLiteral::from_f64`].
    Finite(f64),
    NaN,
    PositiveInfinity,
    NegativeInfinity,
}

impl NumberLiteral {
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            NumberLiteral::NaN
        } else if value == f64::INFINITY {
            NumberLiteral::PositiveInfinity
        } else if value == f64::NEG_INFINITY {
            NumberLiteral::NegativeInfinity
        } else {
            NumberLiteral::Finite(value)
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            NumberLiteral::Finite(value) => value,
            NumberLiteral::NaN => f64::NAN,
            NumberLiteral::PositiveInfinity => f64::INFINITY,
            NumberLiteral::NegativeInfinity => f64::NEG_INFINITY,
        }
    }

    fn sentinel(&self) -> Option<&'static str> {
        match self {
            NumberLiteral::Finite(_) => None,
            NumberLiteral::NaN => Some("NaN"),
            NumberLiteral::PositiveInfinity => Some("Infinity"),
            NumberLiteral::NegativeInfinity => Some("-Infinity"),
        }
    }
}

impl From<f64> for NumberLiteral {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

impl Serialize for NumberLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.sentinel() {
            Some(sentinel) => serializer.serialize_str(sentinel),
            None => serializer.serialize_f64(self.to_f64()),
        }
    }
}

impl<'de> Deserialize<'de> for NumberLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Sentinel(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(NumberLiteral::from_f64(value)),
            Repr::Sentinel(text) => match text.as_str() {
                "NaN" => Ok(NumberLiteral::NaN),
                "Infinity" => Ok(NumberLiteral::PositiveInfinity),
                "-Infinity" => Ok(NumberLiteral::NegativeInfinity),
                other => Err(de::Error::custom(format!(
                    "unknown number sentinel {other:?}"
                ))),
            },
        }
    }
}

/// Contents of a numeric array view, one variant per standard element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "elements")]
pub enum ArrayView {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Uint8Clamped(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Float32(Vec<NumberLiteral>),
    Float64(Vec<NumberLiteral>),
}

impl ArrayView {
    /// Build a view from the engine's type name and element values.
    ///
    /// Integer elements are narrowed with `as`; the engine only hands out
    /// values already in range for the named element type.
    pub fn from_elements(type_name: &str, elements: &[f64]) -> Option<Self> {
        let floats = || elements.iter().copied().map(NumberLiteral::from_f64).collect();
        let view = match type_name {
            "Int8Array" => ArrayView::Int8(elements.iter().map(|&v| v as i8).collect()),
            "Uint8Array" => ArrayView::Uint8(elements.iter().map(|&v| v as u8).collect()),
            "Uint8ClampedArray" => {
                ArrayView::Uint8Clamped(elements.iter().map(|&v| v as u8).collect())
            }
            "Int16Array" => ArrayView::Int16(elements.iter().map(|&v| v as i16).collect()),
            "Uint16Array" => ArrayView::Uint16(elements.iter().map(|&v| v as u16).collect()),
            "Int32Array" => ArrayView::Int32(elements.iter().map(|&v| v as i32).collect()),
            "Uint32Array" => ArrayView::Uint32(elements.iter().map(|&v| v as u32).collect()),
            "Float32Array" => ArrayView::Float32(floats()),
            "Float64Array" => ArrayView::Float64(floats()),
            _ => return None,
        };
        Some(view)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ArrayView::Int8(_) => "Int8Array",
            ArrayView::Uint8(_) => "Uint8Array",
            ArrayView::Uint8Clamped(_) => "Uint8ClampedArray",
            ArrayView::Int16(_) => "Int16Array",
            ArrayView::Uint16(_) => "Uint16Array",
            ArrayView::Int32(_) => "Int32Array",
            ArrayView::Uint32(_) => "Uint32Array",
            ArrayView::Float32(_) => "Float32Array",
            ArrayView::Float64(_) => "Float64Array",
        }
    }

    /// Element width in bytes.
    pub fn byte_width(&self) -> usize {
        match self {
            ArrayView::Int8(_) | ArrayView::Uint8(_) | ArrayView::Uint8Clamped(_) => 1,
            ArrayView::Int16(_) | ArrayView::Uint16(_) => 2,
            ArrayView::Int32(_) | ArrayView::Uint32(_) | ArrayView::Float32(_) => 4,
            ArrayView::Float64(_) => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ArrayView::Int8(_)
                | ArrayView::Int16(_)
                | ArrayView::Int32(_)
                | ArrayView::Float32(_)
                | ArrayView::Float64(_)
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ArrayView::Float32(_) | ArrayView::Float64(_))
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayView::Int8(v) => v.len(),
            ArrayView::Uint8(v) | ArrayView::Uint8Clamped(v) => v.len(),
            ArrayView::Int16(v) => v.len(),
            ArrayView::Uint16(v) => v.len(),
            ArrayView::Int32(v) => v.len(),
            ArrayView::Uint32(v) => v.len(),
            ArrayView::Float32(v) | ArrayView::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            ArrayView::Int8(v) => v.iter().map(|&e| f64::from(e)).collect(),
            ArrayView::Uint8(v) | ArrayView::Uint8Clamped(v) => {
                v.iter().map(|&e| f64::from(e)).collect()
            }
            ArrayView::Int16(v) => v.iter().map(|&e| f64::from(e)).collect(),
            ArrayView::Uint16(v) => v.iter().map(|&e| f64::from(e)).collect(),
            ArrayView::Int32(v) => v.iter().map(|&e| f64::from(e)).collect(),
            ArrayView::Uint32(v) => v.iter().map(|&e| f64::from(e)).collect(),
            ArrayView::Float32(v) | ArrayView::Float64(v) => {
                v.iter().map(|e| e.to_f64()).collect()
            }
        }
    }
}

/// Transportable encoding of one sandbox value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EncodedValue {
    Null,
    Undefined,
    Number {
        value: NumberLiteral,
    },
    String {
        value: String,
    },
    Boolean {
        value: bool,
    },
    /// Milliseconds since the Unix epoch; NaN for an invalid date.
    Timestamp {
        slot: Slot,
        time: NumberLiteral,
    },
    RegExp {
        slot: Slot,
        source: String,
        flags: String,
    },
    Bytes {
        slot: Slot,
        data: Vec<u8>,
    },
    NumericArray {
        slot: Slot,
        view: ArrayView,
    },
    List {
        slot: Slot,
        items: Vec<EncodedValue>,
    },
    Map {
        slot: Slot,
        entries: Vec<(EncodedValue, EncodedValue)>,
    },
    Set {
        slot: Slot,
        items: Vec<EncodedValue>,
    },
    Record {
        slot: Slot,
        entries: Vec<(String, EncodedValue)>,
    },
    Reference {
        slot: Slot,
    },
    /// Descriptive placeholder for values with no structural encoding.
    Opaque {
        label: String,
    },
}

impl EncodedValue {
    pub fn number(value: f64) -> Self {
        EncodedValue::Number {
            value: NumberLiteral::from_f64(value),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        EncodedValue::String {
            value: value.into(),
        }
    }

    pub fn opaque(label: impl Into<String>) -> Self {
        EncodedValue::Opaque {
            label: label.into(),
        }
    }

    /// Placeholder for an argument whose encoding failed.
    pub fn unserializable(reason: impl fmt::Display) -> Self {
        Self::opaque(format!("[Unserializable: {reason}]"))
    }

    /// The identity slot this node defines, if it is an object kind.
    pub fn slot(&self) -> Option<Slot> {
        match self {
            EncodedValue::Timestamp { slot, .. }
            | EncodedValue::RegExp { slot, .. }
            | EncodedValue::Bytes { slot, .. }
            | EncodedValue::NumericArray { slot, .. }
            | EncodedValue::List { slot, .. }
            | EncodedValue::Map { slot, .. }
            | EncodedValue::Set { slot, .. }
            | EncodedValue::Record { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}
