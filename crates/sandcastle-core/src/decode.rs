//! Host-side decoding of encoded arguments.
//!
//! Decoding inverts the sandbox-side classification. Each object-kind node is
//! allocated in the heap *before* its children are decoded, so a
//! `reference` to an enclosing node (a cycle) resolves to an object that is
//! still being filled in.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::encoded::{EncodedValue, Slot};
use crate::error::DecodeError;
use crate::host::{DecodedValue, HostObject, HostValue, ObjectId};

/// Decode one argument. Deterministic for a given input.
pub fn decode(encoded: &EncodedValue) -> Result<DecodedValue, DecodeError> {
    let mut decoder = Decoder::default();
    let root = decoder.value(encoded)?;
    Ok(DecodedValue::new(root, decoder.heap))
}

/// Decode one argument, degrading any failure to an opaque placeholder.
pub fn decode_lossy(encoded: &EncodedValue) -> DecodedValue {
    decode(encoded).unwrap_or_else(|e| undecodable(&e))
}

/// Decode one argument straight from its wire form.
pub fn decode_wire(raw: &serde_json::Value) -> DecodedValue {
    match EncodedValue::deserialize(raw) {
        Ok(encoded) => decode_lossy(&encoded),
        Err(e) => undecodable(&DecodeError::malformed(e)),
    }
}

fn undecodable(error: &DecodeError) -> DecodedValue {
    DecodedValue::opaque(format!("[Undecodable: {error}]"))
}

#[derive(Default)]
struct Decoder {
    heap: Vec<HostObject>,
    slots: HashMap<Slot, ObjectId>,
}

impl Decoder {
    fn value(&mut self, encoded: &EncodedValue) -> Result<HostValue, DecodeError> {
        let value = match encoded {
            EncodedValue::Null => HostValue::Null,
            EncodedValue::Undefined => HostValue::Undefined,
            EncodedValue::Number { value } => HostValue::Number(value.to_f64()),
            EncodedValue::String { value } => HostValue::String(value.clone()),
            EncodedValue::Boolean { value } => HostValue::Boolean(*value),
            EncodedValue::Opaque { label } => HostValue::Opaque(label.clone()),
            EncodedValue::Reference { slot } => self
                .slots
                .get(slot)
                .copied()
                .map(HostValue::Object)
                .ok_or(DecodeError::UnknownSlot(*slot))?,
            EncodedValue::Timestamp { slot, time } => {
                self.leaf(*slot, HostObject::Date(time.to_f64()))?
            }
            EncodedValue::RegExp {
                slot,
                source,
                flags,
            } => self.leaf(
                *slot,
                HostObject::RegExp {
                    source: source.clone(),
                    flags: flags.clone(),
                },
            )?,
            EncodedValue::Bytes { slot, data } => {
                self.leaf(*slot, HostObject::Buffer(data.clone()))?
            }
            EncodedValue::NumericArray { slot, view } => {
                self.leaf(*slot, HostObject::TypedArray(view.clone()))?
            }
            EncodedValue::List { slot, items } => {
                let id = self.allocate(*slot, HostObject::List(Vec::new()))?;
                let items = self.values(items)?;
                self.fill(id, HostObject::List(items))
            }
            EncodedValue::Set { slot, items } => {
                let id = self.allocate(*slot, HostObject::Set(Vec::new()))?;
                let items = self.values(items)?;
                self.fill(id, HostObject::Set(items))
            }
            EncodedValue::Map { slot, entries } => {
                let id = self.allocate(*slot, HostObject::Map(Vec::new()))?;
                let mut decoded = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    decoded.push((self.value(key)?, self.value(value)?));
                }
                self.fill(id, HostObject::Map(decoded))
            }
            EncodedValue::Record { slot, entries } => {
                let id = self.allocate(*slot, HostObject::Record(IndexMap::new()))?;
                let mut decoded = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    decoded.insert(key.clone(), self.value(value)?);
                }
                self.fill(id, HostObject::Record(decoded))
            }
        };
        Ok(value)
    }

    fn values(&mut self, items: &[EncodedValue]) -> Result<Vec<HostValue>, DecodeError> {
        items.iter().map(|item| self.value(item)).collect()
    }

    fn allocate(&mut self, slot: Slot, object: HostObject) -> Result<ObjectId, DecodeError> {
        if self.slots.contains_key(&slot) {
            return Err(DecodeError::DuplicateSlot(slot));
        }
        let id = ObjectId(self.heap.len());
        self.heap.push(object);
        self.slots.insert(slot, id);
        Ok(id)
    }

    fn leaf(&mut self, slot: Slot, object: HostObject) -> Result<HostValue, DecodeError> {
        self.allocate(slot, object).map(HostValue::Object)
    }

    fn fill(&mut self, id: ObjectId, object: HostObject) -> HostValue {
        self.heap[id.0] = object;
        HostValue::Object(id)
    }
}
