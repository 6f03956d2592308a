//! Sandbox-side encoding of logged values.
//!
//! Primitives are classified straight from the engine's value tag. Anything
//! else is handed to the prelude's inspector, which answers with a small
//! descriptor array built from brand checks captured before user code ran:
//!
//! ```text
//! ['symbol', text]            ['date', time]
//! ['bigint', digits]          ['regexp', source, flags]
//! ['function', kind, name?]   ['map', keys, values]
//! ['buffer', bytes]           ['set', values]
//! ['typed', tag, elements]    ['arraybuffer', byteLength]
//! ['array']                   ['opaque', tag]
//! ['record']
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use rquickjs::{Array, Ctx, Function, Object, Value, qjs};
use sandcastle_core::{ArrayView, EncodedValue, NumberLiteral, Slot};

use crate::watchdog::Watchdog;

/// Per-argument state: the identity table, the current depth and the
/// watchdog polled between elements.
pub(crate) struct SerializationContext<'js> {
    inspector: Function<'js>,
    watchdog: Arc<Watchdog>,
    /// Slot arena. Holding the values keeps their addresses unique.
    seen: Vec<Value<'js>>,
    slots: HashMap<usize, Slot>,
    depth: usize,
    max_depth: usize,
    max_items: usize,
}

impl<'js> SerializationContext<'js> {
    pub(crate) fn new(
        inspector: Function<'js>,
        watchdog: Arc<Watchdog>,
        max_depth: usize,
        max_items: usize,
    ) -> Self {
        Self {
            inspector,
            watchdog,
            seen: Vec::new(),
            slots: HashMap::new(),
            depth: 0,
            max_depth,
            max_items,
        }
    }

    fn lookup(&self, value: &Value<'js>) -> Option<Slot> {
        self.slots.get(&identity(value)).copied()
    }

    fn register(&mut self, value: &Value<'js>) -> Slot {
        let slot = Slot(self.seen.len() as u32);
        self.slots.insert(identity(value), slot);
        self.seen.push(value.clone());
        slot
    }

    fn too_deep(&self) -> bool {
        self.depth >= self.max_depth
    }

    /// Fails once the deadline passed or the context is being torn down.
    fn checkpoint(&self) -> rquickjs::Result<()> {
        if self.watchdog.should_stop() {
            return Err(rquickjs::Error::new_from_js_message(
                "value",
                "encoding",
                "interrupted",
            ));
        }
        Ok(())
    }
}

/// Heap address of a non-primitive value.
fn identity(value: &Value<'_>) -> usize {
    // SAFETY: only reached for object-like values, whose payload is a pointer.
    unsafe { qjs::JS_VALUE_GET_PTR(value.as_raw()) as usize }
}

/// Encode one value, walking into composites.
pub(crate) fn encode<'js>(
    ctx: &Ctx<'js>,
    value: &Value<'js>,
    sc: &mut SerializationContext<'js>,
) -> rquickjs::Result<EncodedValue> {
    if value.is_undefined() {
        return Ok(EncodedValue::Undefined);
    }
    if value.is_null() {
        return Ok(EncodedValue::Null);
    }
    if let Some(value) = value.as_bool() {
        return Ok(EncodedValue::Boolean { value });
    }
    if let Some(n) = value.as_int() {
        return Ok(EncodedValue::number(f64::from(n)));
    }
    if let Some(n) = value.as_float() {
        return Ok(EncodedValue::number(n));
    }
    if let Some(s) = value.as_string() {
        return Ok(EncodedValue::string(s.to_string()?));
    }

    if let Some(slot) = sc.lookup(value) {
        return Ok(EncodedValue::Reference { slot });
    }
    // Promise state is an internal slot; no script-visible check is reliable.
    if value.is_promise() {
        let label = opaque_label(ctx, value, "Promise");
        return Ok(EncodedValue::opaque(format!("[{label}]")));
    }

    let descriptor: Array<'js> = sc.inspector.call((value.clone(),))?;
    let kind: String = descriptor.get(0)?;

    match kind.as_str() {
        "symbol" => Ok(EncodedValue::opaque(descriptor.get::<String>(1)?)),
        "bigint" => Ok(EncodedValue::opaque(format!(
            "{}n",
            descriptor.get::<String>(1)?
        ))),
        "function" => {
            let category: String = descriptor.get(1)?;
            let name: Option<String> = descriptor.get(2)?;
            let label = opaque_label(ctx, value, &category);
            Ok(EncodedValue::opaque(match name {
                Some(name) => format!("[{label}: {name}]"),
                None => format!("[{label}]"),
            }))
        }
        "arraybuffer" => {
            let byte_length: f64 = descriptor.get(1)?;
            let label = opaque_label(ctx, value, "ArrayBuffer");
            Ok(EncodedValue::opaque(format!(
                "[{label} {{ byteLength: {byte_length} }}]"
            )))
        }
        "opaque" => {
            let tag: String = descriptor.get(1)?;
            let label = opaque_label(ctx, value, &tag);
            Ok(EncodedValue::opaque(format!("[{label}]")))
        }
        "buffer" => {
            let bytes: Vec<f64> = descriptor.get(1)?;
            let slot = sc.register(value);
            Ok(EncodedValue::Bytes {
                slot,
                data: bytes.into_iter().map(|b| b as u8).collect(),
            })
        }
        "typed" => {
            let tag: String = descriptor.get(1)?;
            let elements: Vec<f64> = descriptor.get(2)?;
            match ArrayView::from_elements(&tag, &elements) {
                Some(view) => Ok(EncodedValue::NumericArray {
                    slot: sc.register(value),
                    view,
                }),
                None => Ok(EncodedValue::opaque(format!("[{tag}]"))),
            }
        }
        "date" => {
            let time: f64 = descriptor.get(1)?;
            Ok(EncodedValue::Timestamp {
                slot: sc.register(value),
                time: NumberLiteral::from_f64(time),
            })
        }
        "regexp" => Ok(EncodedValue::RegExp {
            slot: sc.register(value),
            source: descriptor.get(1)?,
            flags: descriptor.get(2)?,
        }),
        "array" => encode_list(ctx, value, sc),
        "map" => {
            if sc.too_deep() {
                return Ok(EncodedValue::opaque("[Object]"));
            }
            let keys: Array<'js> = descriptor.get(1)?;
            let values: Array<'js> = descriptor.get(2)?;
            let slot = sc.register(value);
            sc.depth += 1;
            let mut entries = Vec::with_capacity(keys.len());
            for i in 0..keys.len() {
                sc.checkpoint()?;
                let key = encode(ctx, &keys.get::<Value<'js>>(i)?, sc)?;
                let value = encode(ctx, &values.get::<Value<'js>>(i)?, sc)?;
                entries.push((key, value));
            }
            sc.depth -= 1;
            Ok(EncodedValue::Map { slot, entries })
        }
        "set" => {
            if sc.too_deep() {
                return Ok(EncodedValue::opaque("[Object]"));
            }
            let values: Array<'js> = descriptor.get(1)?;
            let slot = sc.register(value);
            sc.depth += 1;
            let mut items = Vec::with_capacity(values.len());
            for i in 0..values.len() {
                sc.checkpoint()?;
                items.push(encode(ctx, &values.get::<Value<'js>>(i)?, sc)?);
            }
            sc.depth -= 1;
            Ok(EncodedValue::Set { slot, items })
        }
        _ => encode_record(ctx, value, sc),
    }
}

fn as_object<'js>(value: &Value<'js>) -> rquickjs::Result<Object<'js>> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| rquickjs::Error::new_from_js("value", "object"))
}

fn encode_list<'js>(
    ctx: &Ctx<'js>,
    value: &Value<'js>,
    sc: &mut SerializationContext<'js>,
) -> rquickjs::Result<EncodedValue> {
    if sc.too_deep() {
        return Ok(EncodedValue::opaque("[Array]"));
    }
    let object = as_object(value)?;
    let length: f64 = object.get("length")?;
    // `length` is script controlled and may describe a huge sparse array.
    let length = length.max(0.0) as u64;
    let walked = length.min(sc.max_items as u64);
    let slot = sc.register(value);
    sc.depth += 1;
    let mut items = Vec::with_capacity(walked.min(1024) as usize);
    for i in 0..walked {
        sc.checkpoint()?;
        let item: Value<'js> = object.get(i as u32)?;
        items.push(encode(ctx, &item, sc)?);
    }
    sc.depth -= 1;
    if length > walked {
        items.push(EncodedValue::opaque(format!(
            "... {} more items",
            length - walked
        )));
    }
    Ok(EncodedValue::List { slot, items })
}

fn encode_record<'js>(
    ctx: &Ctx<'js>,
    value: &Value<'js>,
    sc: &mut SerializationContext<'js>,
) -> rquickjs::Result<EncodedValue> {
    if sc.too_deep() {
        return Ok(EncodedValue::opaque("[Object]"));
    }
    let object = as_object(value)?;
    let slot = sc.register(value);
    sc.depth += 1;
    let mut entries = Vec::new();
    for key in object.keys::<String>() {
        sc.checkpoint()?;
        let key = key?;
        let item: Value<'js> = object.get(key.as_str())?;
        entries.push((key, encode(ctx, &item, sc)?));
    }
    sc.depth -= 1;
    Ok(EncodedValue::Record { slot, entries })
}

/// `constructor.name` when it is a non-empty string, else `fallback`.
///
/// Both reads may run script (getters, proxies); any exception they raise
/// is cleared and the fallback is used.
fn opaque_label<'js>(ctx: &Ctx<'js>, value: &Value<'js>, fallback: &str) -> String {
    let read = || -> rquickjs::Result<Option<String>> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };
        let constructor: Value<'js> = object.get("constructor")?;
        let Some(constructor) = constructor.as_object() else {
            return Ok(None);
        };
        let name: Value<'js> = constructor.get("name")?;
        let name = name.as_string().map(|s| s.to_string()).transpose()?;
        Ok(name.filter(|name| !name.is_empty()))
    };

    match read() {
        Ok(Some(name)) => name,
        Ok(None) => fallback.to_string(),
        Err(_) => {
            let _ = ctx.catch();
            fallback.to_string()
        }
    }
}
