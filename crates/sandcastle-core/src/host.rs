//! Host-native values rebuilt from an encoded argument.
//!
//! Composite values live in a per-argument heap and are referred to by
//! [`ObjectId`]. Two places in one [`DecodedValue`] that hold the same
//! `ObjectId` are the same object, which is how circular graphs logged in the
//! sandbox keep their shape on the host.

use indexmap::IndexMap;

use crate::encoded::ArrayView;

/// Position of an object in a [`DecodedValue`] heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Undefined,
    Null,
    Number(f64),
    String(String),
    Boolean(bool),
    Object(ObjectId),
    /// Placeholder text for values that had no structural encoding, or
    /// for arguments that failed to encode or decode.
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostObject {
    /// Milliseconds since the Unix epoch; NaN for an invalid date.
    Date(f64),
    RegExp { source: String, flags: String },
    Buffer(Vec<u8>),
    TypedArray(ArrayView),
    List(Vec<HostValue>),
    Map(Vec<(HostValue, HostValue)>),
    Set(Vec<HostValue>),
    Record(IndexMap<String, HostValue>),
}

impl HostObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostObject::Date(_) => "Date",
            HostObject::RegExp { .. } => "RegExp",
            HostObject::Buffer(_) => "Buffer",
            HostObject::TypedArray(view) => view.type_name(),
            HostObject::List(_) => "Array",
            HostObject::Map(_) => "Map",
            HostObject::Set(_) => "Set",
            HostObject::Record(_) => "Object",
        }
    }
}

static UNDEFINED: HostValue = HostValue::Undefined;

/// One decoded console argument together with the objects it reaches.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    root: HostValue,
    heap: Vec<HostObject>,
}

impl DecodedValue {
    pub(crate) fn new(root: HostValue, heap: Vec<HostObject>) -> Self {
        Self { root, heap }
    }

    pub fn undefined() -> Self {
        Self::new(HostValue::Undefined, Vec::new())
    }

    pub fn opaque(label: impl Into<String>) -> Self {
        Self::new(HostValue::Opaque(label.into()), Vec::new())
    }

    pub fn root(&self) -> &HostValue {
        &self.root
    }

    pub fn heap(&self) -> &[HostObject] {
        &self.heap
    }

    pub fn object(&self, id: ObjectId) -> Option<&HostObject> {
        self.heap.get(id.0)
    }

    pub fn view(&self) -> ValueView<'_> {
        ValueView {
            value: &self.root,
            heap: &self.heap,
        }
    }
}

/// Borrowed cursor over a [`DecodedValue`].
#[derive(Debug, Clone, Copy)]
pub struct ValueView<'a> {
    value: &'a HostValue,
    heap: &'a [HostObject],
}

impl<'a> ValueView<'a> {
    /// A view of `undefined`, used for argument slots past the end.
    pub fn undefined() -> ValueView<'static> {
        ValueView {
            value: &UNDEFINED,
            heap: &[],
        }
    }

    fn at(&self, value: &'a HostValue) -> ValueView<'a> {
        ValueView {
            value,
            heap: self.heap,
        }
    }

    pub fn value(&self) -> &'a HostValue {
        self.value
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self.value {
            HostValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<&'a HostObject> {
        self.object_id().and_then(|id| self.heap.get(id.0))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.value, HostValue::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, HostValue::Null)
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self.value {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&'a str> {
        match self.value {
            HostValue::Opaque(label) => Some(label),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            HostValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<f64> {
        match self.object()? {
            HostObject::Date(millis) => Some(*millis),
            _ => None,
        }
    }

    /// `(source, flags)` of a regular expression.
    pub fn as_regexp(&self) -> Option<(&'a str, &'a str)> {
        match self.object()? {
            HostObject::RegExp { source, flags } => Some((source, flags)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self.object()? {
            HostObject::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_typed_array(&self) -> Option<&'a ArrayView> {
        match self.object()? {
            HostObject::TypedArray(view) => Some(view),
            _ => None,
        }
    }

    /// Property of a record.
    pub fn get(&self, key: &str) -> Option<ValueView<'a>> {
        match self.object()? {
            HostObject::Record(entries) => entries.get(key).map(|v| self.at(v)),
            _ => None,
        }
    }

    /// Element of a list, or of a set in iteration order.
    pub fn index(&self, index: usize) -> Option<ValueView<'a>> {
        match self.object()? {
            HostObject::List(items) | HostObject::Set(items) => {
                items.get(index).map(|v| self.at(v))
            }
            _ => None,
        }
    }

    pub fn keys(&self) -> Option<Vec<&'a str>> {
        match self.object()? {
            HostObject::Record(entries) => Some(entries.keys().map(String::as_str).collect()),
            _ => None,
        }
    }

    /// Key/value pairs of a map in iteration order.
    pub fn map_entries(&self) -> Option<Vec<(ValueView<'a>, ValueView<'a>)>> {
        match self.object()? {
            HostObject::Map(entries) => {
                Some(entries.iter().map(|(k, v)| (self.at(k), self.at(v))).collect())
            }
            _ => None,
        }
    }

    /// Number of entries of any container kind.
    pub fn len(&self) -> Option<usize> {
        match self.object()? {
            HostObject::List(items) | HostObject::Set(items) => Some(items.len()),
            HostObject::Map(entries) => Some(entries.len()),
            HostObject::Record(entries) => Some(entries.len()),
            HostObject::Buffer(bytes) => Some(bytes.len()),
            HostObject::TypedArray(view) => Some(view.len()),
            HostObject::Date(_) | HostObject::RegExp { .. } => None,
        }
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}
