//! The host-facing value type and the conversions across the engine
//! boundary.
//!
//! Engine values convert into plain owned data for hosts (deeply, with a
//! depth bound and cycle guard); host values convert back when natives
//! return or hosts seed globals. Functions and symbols cross the boundary
//! as opaque descriptions.

use crate::{
    call::Vm,
    heap::{HeapData, HeapId},
    object::{self, Property},
    value::{self, Value},
};

/// A JS value as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsValue>),
    /// Plain object as ordered key/value pairs.
    Object(Vec<(String, JsValue)>),
    /// An opaque function; only the name crosses the boundary.
    Function(String),
}

impl JsValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl std::fmt::Display for JsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", value::number_to_string(*n)),
            Self::String(s) => write!(f, "{s}"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Object(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Self::Function(name) => write!(f, "[Function: {name}]"),
        }
    }
}

const CONVERT_DEPTH_LIMIT: usize = 16;

/// Converts an engine value into host data (borrowed; refcounts untouched).
pub(crate) fn value_to_js(vm: &Vm<'_>, value: &Value) -> JsValue {
    let mut seen = Vec::new();
    convert_out(vm, value, 0, &mut seen)
}

fn convert_out(vm: &Vm<'_>, value: &Value, depth: usize, seen: &mut Vec<HeapId>) -> JsValue {
    match value {
        Value::Undefined => JsValue::Undefined,
        Value::Null => JsValue::Null,
        Value::Bool(b) => JsValue::Bool(*b),
        Value::Number(n) => JsValue::Number(*n),
        Value::Str(id) => JsValue::String(vm.interns.get(*id).to_owned()),
        Value::Sym(id) => JsValue::String(vm.interns.symbol_to_string(*id)),
        Value::Ref(id) => {
            if let Some(s) = vm.heap.as_str(*id) {
                return JsValue::String(s.to_owned());
            }
            if depth > CONVERT_DEPTH_LIMIT || seen.contains(id) {
                return JsValue::Undefined;
            }
            seen.push(*id);
            let out = match vm.heap.get(*id) {
                HeapData::Array(array) => JsValue::Array(
                    array.elements.iter().map(|e| convert_out(vm, e, depth + 1, seen)).collect(),
                ),
                HeapData::Function(f) => JsValue::Function(vm.interns.get(f.name).to_owned()),
                HeapData::Promise(p) => JsValue::Object(vec![(
                    "status".to_owned(),
                    JsValue::String(p.state_tag().to_owned()),
                )]),
                HeapData::Date(d) => match d.to_iso_string() {
                    Some(s) => JsValue::String(s),
                    None => JsValue::Null,
                },
                HeapData::Regex(r) => JsValue::String(format!("/{}/{}", r.source, r.flag_string())),
                HeapData::Object(table) => JsValue::Object(
                    table
                        .enumerable_own_entries()
                        .filter_map(|(key, prop)| {
                            prop.data_value().map(|v| {
                                (key.render(vm.interns), convert_out(vm, v, depth + 1, seen))
                            })
                        })
                        .collect(),
                ),
                _ => JsValue::Undefined,
            };
            seen.pop();
            out
        }
    }
}

/// Converts host data into an engine value (the caller owns the result).
pub(crate) fn js_to_value(vm: &mut Vm<'_>, value: &JsValue) -> Value {
    match value {
        JsValue::Undefined => Value::Undefined,
        JsValue::Null => Value::Null,
        JsValue::Bool(b) => Value::Bool(*b),
        JsValue::Number(n) => Value::Number(*n),
        JsValue::String(s) | JsValue::Function(s) => Value::str(vm.heap, s),
        JsValue::Array(items) => {
            let elements: Vec<Value> = items.iter().map(|item| js_to_value(vm, item)).collect();
            Value::Ref(object::new_array(vm, elements))
        }
        JsValue::Object(entries) => {
            let proto = vm.realm.intrinsics.object_prototype;
            vm.heap.inc_ref(proto);
            let id = object::new_object(vm.heap, Some(proto));
            for (key, entry) in entries {
                let converted = js_to_value(vm, entry);
                let key = value::key_from_str(vm.interns, key);
                object::define(vm.heap, id, key, Property::data(converted));
            }
            Value::Ref(id)
        }
    }
}
