//! `JSON.parse` and `JSON.stringify`.
//!
//! Parsing rides on serde_json (with insertion order preserved);
//! stringification is a hand-rolled walk so JS semantics hold: `undefined`
//! and functions vanish from objects and become `null` in arrays, `toJSON`
//! is honored, and cycles are a TypeError.

use crate::{
    call::Vm,
    error::{RunError, RunResult},
    heap::HeapId,
    intern::StaticStrings,
    object::{self as obj, PropKey},
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install(b: &mut RealmBuilder<'_>, global: HeapId) {
    let json = b.namespace();
    b.method(json, "parse", Builtin::JsonParse);
    b.method(json, "stringify", Builtin::JsonStringify);
    b.builtin_data(global, "JSON", Value::Ref(json));
}

pub(crate) fn json_parse(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let input = args.take(0);
    args.finish(vm);
    let text = value::to_string(vm, &input);
    input.drop_with_heap(vm.heap);
    let text = text?;
    let parsed: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| RunError::syntax_error(format!("Unexpected token in JSON: {e}")))?;
    Ok(json_to_value(vm, &parsed))
}

fn json_to_value(vm: &mut Vm<'_>, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::str(vm.heap, s),
        serde_json::Value::Array(items) => {
            let elements: Vec<Value> = items.iter().map(|item| json_to_value(vm, item)).collect();
            Value::Ref(obj::new_array(vm, elements))
        }
        serde_json::Value::Object(map) => {
            let proto = vm.realm.intrinsics.object_prototype;
            vm.heap.inc_ref(proto);
            let obj_id = obj::new_object(vm.heap, Some(proto));
            for (key, entry) in map {
                let value = json_to_value(vm, entry);
                let key = value::key_from_str(vm.interns, key);
                obj::define(vm.heap, obj_id, key, crate::object::Property::data(value));
            }
            Value::Ref(obj_id)
        }
    }
}

pub(crate) fn json_stringify(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let target = args.take(0);
    // The replacer argument is accepted but not applied (only the indent
    // argument shapes output).
    let _replacer = args.take(1);
    _replacer.drop_with_heap(vm.heap);
    let indent_arg = args.take(2);
    args.finish(vm);
    let indent = match &indent_arg {
        Value::Number(n) if *n >= 1.0 => " ".repeat((*n as usize).min(10)),
        other => match other.as_js_str(vm.heap, vm.interns) {
            Some(s) => s.chars().take(10).collect(),
            None => String::new(),
        },
    };
    indent_arg.drop_with_heap(vm.heap);

    let mut seen = Vec::new();
    let mut out = String::new();
    let produced = stringify_value(vm, &target, &indent, 0, &mut seen, &mut out);
    target.drop_with_heap(vm.heap);
    match produced? {
        true => Ok(Value::str(vm.heap, &out)),
        false => Ok(Value::Undefined),
    }
}

/// Writes the JSON for `value` into `out`; returns false for values that
/// serialize to nothing (undefined, functions).
fn stringify_value(
    vm: &mut Vm<'_>,
    value: &Value,
    indent: &str,
    depth: usize,
    seen: &mut Vec<HeapId>,
    out: &mut String,
) -> RunResult<bool> {
    match value {
        Value::Undefined | Value::Sym(_) => Ok(false),
        Value::Null => {
            out.push_str("null");
            Ok(true)
        }
        Value::Bool(b) => {
            out.push_str(if *b { "true" } else { "false" });
            Ok(true)
        }
        Value::Number(n) => {
            if n.is_finite() {
                out.push_str(&value::number_to_string(*n));
            } else {
                out.push_str("null");
            }
            Ok(true)
        }
        Value::Str(id) => {
            let quoted = serde_json::Value::String(vm.interns.get(*id).to_owned()).to_string();
            out.push_str(&quoted);
            Ok(true)
        }
        Value::Ref(id) => {
            let id = *id;
            if let Some(s) = vm.heap.as_str(id) {
                let quoted = serde_json::Value::String(s.to_owned()).to_string();
                out.push_str(&quoted);
                return Ok(true);
            }
            if vm.heap.function(id).is_some() {
                return Ok(false);
            }
            // toJSON hook (dates serialize as ISO strings through it).
            let to_json = obj::get(vm, value, &PropKey::Atom(StaticStrings::ToJSON.id()))?;
            if to_json.is_callable(vm.heap) {
                let this = value.clone_with_heap(vm.heap);
                let result = crate::call::call_value(vm, &to_json, this, Vec::new(), crate::ast::Span::default());
                to_json.drop_with_heap(vm.heap);
                let result = result?;
                let produced = stringify_value(vm, &result, indent, depth, seen, out);
                result.drop_with_heap(vm.heap);
                return produced;
            }
            to_json.drop_with_heap(vm.heap);
            if seen.contains(&id) {
                return Err(RunError::type_error("Converting circular structure to JSON"));
            }
            seen.push(id);
            let result = stringify_container(vm, value, id, indent, depth, seen, out);
            seen.pop();
            result
        }
    }
}

fn stringify_container(
    vm: &mut Vm<'_>,
    value: &Value,
    id: HeapId,
    indent: &str,
    depth: usize,
    seen: &mut Vec<HeapId>,
    out: &mut String,
) -> RunResult<bool> {
    let (open, close, is_array) = if vm.heap.array(id).is_some() { ('[', ']', true) } else { ('{', '}', false) };
    out.push(open);
    let mut first = true;
    if is_array {
        let len = vm.heap.array(id).expect("array checked").elements.len();
        for index in 0..len {
            push_separator(out, indent, depth + 1, &mut first);
            let element = obj::get(vm, value, &PropKey::Index(u32::try_from(index).unwrap_or(u32::MAX)))?;
            let produced = stringify_value(vm, &element, indent, depth + 1, seen, out)?;
            element.drop_with_heap(vm.heap);
            if !produced {
                out.push_str("null");
            }
        }
    } else {
        let keys = obj::enumerable_own_string_keys(vm.heap, id);
        for key in keys {
            let entry = obj::get(vm, value, &key)?;
            // Probe on a scratch buffer so skipped members leave no comma.
            let mut scratch = String::new();
            let produced = stringify_value(vm, &entry, indent, depth + 1, seen, &mut scratch)?;
            entry.drop_with_heap(vm.heap);
            if !produced {
                continue;
            }
            push_separator(out, indent, depth + 1, &mut first);
            let key_text = key.render(vm.interns);
            out.push_str(&serde_json::Value::String(key_text).to_string());
            out.push(':');
            if !indent.is_empty() {
                out.push(' ');
            }
            out.push_str(&scratch);
        }
    }
    if !first && !indent.is_empty() {
        out.push('\n');
        out.push_str(&indent.repeat(depth));
    }
    out.push(close);
    Ok(true)
}

fn push_separator(out: &mut String, indent: &str, depth: usize, first: &mut bool) {
    if !*first {
        out.push(',');
    }
    *first = false;
    if !indent.is_empty() {
        out.push('\n');
        out.push_str(&indent.repeat(depth));
    }
}
