//! Host-side rendering of decoded values.
//!
//! `Display` gives a single-line, Node-style rendering used by the CLI's
//! pretty output. [`DecodedValue::to_json`] gives a lossy JSON rendering for
//! machine consumption.
//!
//! A collection is expanded at most once per rendering. A back-edge to an
//! ancestor prints `[Circular]`; any other repeat prints `[Ref: <kind>]`, so
//! output stays linear in the size of the decoded graph.

use std::collections::HashSet;
use std::fmt::{self, Write};

use serde_json::{Map as JsonMap, Value};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::host::{DecodedValue, HostObject, HostValue, ObjectId};

const CIRCULAR: &str = "[Circular]";

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root() {
            // Top-level strings print bare, like console.log does.
            HostValue::String(s) => f.write_str(s),
            root => Printer::new(self).value(f, root),
        }
    }
}

impl DecodedValue {
    /// Lossy JSON rendering: non-finite numbers become strings, back-edges
    /// become `"[Circular]"`, repeated collections become `"[Ref: <kind>]"`
    /// and `undefined` becomes `null`.
    pub fn to_json(&self) -> Value {
        Printer::new(self).json(self.root())
    }
}

/// JavaScript-style number text.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// ISO-8601 rendering of epoch milliseconds, `Invalid Date` when the time
/// value is not representable.
pub fn format_date(millis: f64) -> String {
    if !millis.is_finite() {
        return "Invalid Date".to_string();
    }
    let nanos = (millis as i128).saturating_mul(1_000_000);
    let format =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|date| date.format(format).ok())
        .unwrap_or_else(|| "Invalid Date".to_string())
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// How an object reached during rendering is shown.
enum Visit<'a> {
    Expand(&'a HostObject),
    Circular,
    Repeated(&'static str),
    Missing,
}

struct Printer<'a> {
    decoded: &'a DecodedValue,
    path: Vec<ObjectId>,
    expanded: HashSet<ObjectId>,
}

impl<'a> Printer<'a> {
    fn new(decoded: &'a DecodedValue) -> Self {
        Self {
            decoded,
            path: Vec::new(),
            expanded: HashSet::new(),
        }
    }

    fn visit(&mut self, id: ObjectId) -> Visit<'a> {
        if self.path.contains(&id) {
            return Visit::Circular;
        }
        let Some(object) = self.decoded.object(id) else {
            return Visit::Missing;
        };
        let collection = matches!(
            object,
            HostObject::List(_) | HostObject::Map(_) | HostObject::Set(_) | HostObject::Record(_)
        );
        if collection && !self.expanded.insert(id) {
            return Visit::Repeated(object.kind_name());
        }
        Visit::Expand(object)
    }

    fn value(&mut self, f: &mut impl Write, value: &HostValue) -> fmt::Result {
        match value {
            HostValue::Undefined => f.write_str("undefined"),
            HostValue::Null => f.write_str("null"),
            HostValue::Number(n) => f.write_str(&format_number(*n)),
            HostValue::String(s) => f.write_str(&quote(s)),
            HostValue::Boolean(b) => write!(f, "{b}"),
            HostValue::Opaque(label) => f.write_str(label),
            HostValue::Object(id) => match self.visit(*id) {
                Visit::Expand(object) => {
                    self.path.push(*id);
                    let result = self.object(f, object);
                    self.path.pop();
                    result
                }
                Visit::Circular => f.write_str(CIRCULAR),
                Visit::Repeated(kind) => write!(f, "[Ref: {kind}]"),
                Visit::Missing => f.write_str("[Unknown]"),
            },
        }
    }

    fn object(&mut self, f: &mut impl Write, object: &HostObject) -> fmt::Result {
        match object {
            HostObject::Date(millis) => f.write_str(&format_date(*millis)),
            HostObject::RegExp { source, flags } => write!(f, "/{source}/{flags}"),
            HostObject::Buffer(bytes) => {
                f.write_str("<Buffer")?;
                for byte in bytes {
                    write!(f, " {byte:02x}")?;
                }
                if bytes.is_empty() {
                    f.write_str(" ")?;
                }
                f.write_str(">")
            }
            HostObject::TypedArray(view) => {
                let elements = view.to_f64_vec();
                write!(f, "{}({}) ", view.type_name(), elements.len())?;
                if elements.is_empty() {
                    return f.write_str("[]");
                }
                f.write_str("[ ")?;
                for (i, n) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&format_number(*n))?;
                }
                f.write_str(" ]")
            }
            HostObject::List(items) => {
                if items.is_empty() {
                    return f.write_str("[]");
                }
                f.write_str("[ ")?;
                self.sequence(f, items)?;
                f.write_str(" ]")
            }
            HostObject::Set(items) => {
                write!(f, "Set({}) ", items.len())?;
                if items.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                self.sequence(f, items)?;
                f.write_str(" }")
            }
            HostObject::Map(entries) => {
                write!(f, "Map({}) ", entries.len())?;
                if entries.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.value(f, key)?;
                    f.write_str(" => ")?;
                    self.value(f, value)?;
                }
                f.write_str(" }")
            }
            HostObject::Record(entries) => {
                if entries.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if is_identifier(key) {
                        f.write_str(key)?;
                    } else {
                        f.write_str(&quote(key))?;
                    }
                    f.write_str(": ")?;
                    self.value(f, value)?;
                }
                f.write_str(" }")
            }
        }
    }

    fn sequence(&mut self, f: &mut impl Write, items: &[HostValue]) -> fmt::Result {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            self.value(f, item)?;
        }
        Ok(())
    }

    fn json(&mut self, value: &HostValue) -> Value {
        match value {
            HostValue::Undefined | HostValue::Null => Value::Null,
            HostValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(format_number(*n))),
            HostValue::String(s) => Value::String(s.clone()),
            HostValue::Boolean(b) => Value::Bool(*b),
            HostValue::Opaque(label) => Value::String(label.clone()),
            HostValue::Object(id) => match self.visit(*id) {
                Visit::Expand(object) => {
                    self.path.push(*id);
                    let json = self.json_object(object);
                    self.path.pop();
                    json
                }
                Visit::Circular => Value::String(CIRCULAR.to_string()),
                Visit::Repeated(kind) => Value::String(format!("[Ref: {kind}]")),
                Visit::Missing => Value::Null,
            },
        }
    }

    fn json_object(&mut self, object: &HostObject) -> Value {
        match object {
            HostObject::Date(millis) => Value::String(format_date(*millis)),
            HostObject::RegExp { source, flags } => Value::String(format!("/{source}/{flags}")),
            HostObject::Buffer(bytes) => bytes.iter().map(|&b| Value::from(b)).collect(),
            HostObject::TypedArray(view) => view
                .to_f64_vec()
                .into_iter()
                .map(|n| self.json(&HostValue::Number(n)))
                .collect(),
            HostObject::List(items) | HostObject::Set(items) => {
                items.iter().map(|item| self.json(item)).collect()
            }
            HostObject::Map(entries) => entries
                .iter()
                .map(|(k, v)| Value::Array(vec![self.json(k), self.json(v)]))
                .collect(),
            HostObject::Record(entries) => {
                let mut map = JsonMap::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), self.json(value));
                }
                Value::Object(map)
            }
        }
    }
}
