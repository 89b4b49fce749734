//! String prototype methods.
//!
//! Index arguments address characters (`char` boundaries), not UTF-16 code
//! units; the difference is only observable past the basic multilingual
//! plane.

use crate::{
    call::{self, Vm},
    error::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticStrings, SymbolId},
    object::{self as obj, PropKey, PropTable, Property},
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.string_prototype;
    b.method(proto, "charAt", Builtin::StrCharAt);
    b.method(proto, "charCodeAt", Builtin::StrCharCodeAt);
    b.method(proto, "slice", Builtin::StrSlice);
    b.method(proto, "match", Builtin::StrMatch);
    b.method(proto, "replace", Builtin::StrReplace);
    b.method(proto, "search", Builtin::StrSearch);
    b.method(proto, "includes", Builtin::StrIncludes);
    b.method(proto, "indexOf", Builtin::StrIndexOf);
    b.method(proto, "toUpperCase", Builtin::StrToUpperCase);
    b.method(proto, "toLowerCase", Builtin::StrToLowerCase);
    b.method(proto, "trim", Builtin::StrTrim);
    b.method(proto, "split", Builtin::StrSplit);
    b.method(proto, "repeat", Builtin::StrRepeat);
    b.method(proto, "startsWith", Builtin::StrStartsWith);
    b.method(proto, "endsWith", Builtin::StrEndsWith);
    b.method(proto, "padStart", Builtin::StrPadStart);
    b.method(proto, "padEnd", Builtin::StrPadEnd);
    b.method(proto, "toString", Builtin::StrToString);
    b.method(proto, "valueOf", Builtin::StrToString);
    b.symbol_method(proto, SymbolId::ITERATOR, "[Symbol.iterator]", Builtin::StrIterator);
}

pub(crate) fn install_globals(_b: &mut RealmBuilder<'_>, _global: HeapId) {
    // The `String` constructor is installed with the other wrappers in
    // `object::install_globals`.
}

fn this_string(vm: &mut Vm<'_>, this: &Value) -> RunResult<String> {
    match this.as_js_str(vm.heap, vm.interns) {
        Some(s) => Ok(s.to_owned()),
        None => value::to_string(vm, this),
    }
}

pub(crate) fn dispatch(vm: &mut Vm<'_>, builtin: Builtin, this: Value, mut args: Args) -> RunResult<Value> {
    if matches!(builtin, Builtin::StrIterNext) {
        // `this` is the iterator object, not a string.
        return str_iter_next(vm, this, args);
    }
    let result = (|| -> RunResult<Value> {
        let text = this_string(vm, &this)?;
        match builtin {
            Builtin::StrToString => Ok(Value::str(vm.heap, &text)),
            Builtin::StrCharAt => {
                let n = take_number(vm, &mut args, 0, 0.0)?;
                let ch = text.chars().nth(n.max(0.0) as usize).map(|c| c.to_string()).unwrap_or_default();
                Ok(Value::str(vm.heap, &ch))
            }
            Builtin::StrCharCodeAt => {
                let n = take_number(vm, &mut args, 0, 0.0)?;
                match text.chars().nth(n.max(0.0) as usize) {
                    Some(c) => Ok(Value::Number(f64::from(c as u32))),
                    None => Ok(Value::Number(f64::NAN)),
                }
            }
            Builtin::StrSlice => {
                let chars: Vec<char> = text.chars().collect();
                let len = chars.len();
                let start = take_number(vm, &mut args, 0, 0.0)?;
                let end = take_number(vm, &mut args, 1, len as f64)?;
                let from = relative(start, len);
                let to = relative(end, len);
                let out: String = if from < to { chars[from..to].iter().collect() } else { String::new() };
                Ok(Value::str(vm.heap, &out))
            }
            Builtin::StrIncludes | Builtin::StrIndexOf | Builtin::StrStartsWith | Builtin::StrEndsWith => {
                let needle = args.take(0);
                let needle_text = value::to_string(vm, &needle);
                needle.drop_with_heap(vm.heap);
                let needle_text = needle_text?;
                match builtin {
                    Builtin::StrIncludes => Ok(Value::Bool(text.contains(&needle_text))),
                    Builtin::StrStartsWith => Ok(Value::Bool(text.starts_with(&needle_text))),
                    Builtin::StrEndsWith => Ok(Value::Bool(text.ends_with(&needle_text))),
                    _ => {
                        // indexOf reports character positions, not bytes.
                        let byte_pos = text.find(&needle_text);
                        Ok(Value::Number(match byte_pos {
                            Some(b) => text[..b].chars().count() as f64,
                            None => -1.0,
                        }))
                    }
                }
            }
            Builtin::StrToUpperCase => Ok(Value::str(vm.heap, &text.to_uppercase())),
            Builtin::StrToLowerCase => Ok(Value::str(vm.heap, &text.to_lowercase())),
            Builtin::StrTrim => Ok(Value::str(vm.heap, text.trim())),
            Builtin::StrRepeat => {
                let n = take_number(vm, &mut args, 0, 0.0)?;
                if n < 0.0 || !n.is_finite() {
                    return Err(RunError::range_error("Invalid count value"));
                }
                Ok(Value::str(vm.heap, &text.repeat(n as usize)))
            }
            Builtin::StrPadStart | Builtin::StrPadEnd => {
                let target = take_number(vm, &mut args, 0, 0.0)? as usize;
                let pad = args.take(1);
                let pad_text = if pad.is_undefined() {
                    " ".to_owned()
                } else {
                    let s = value::to_string(vm, &pad);
                    pad.drop_with_heap(vm.heap);
                    s?
                };
                let len = text.chars().count();
                if len >= target || pad_text.is_empty() {
                    return Ok(Value::str(vm.heap, &text));
                }
                let mut padding = String::new();
                while padding.chars().count() < target - len {
                    padding.push_str(&pad_text);
                }
                let padding: String = padding.chars().take(target - len).collect();
                let out = if matches!(builtin, Builtin::StrPadStart) {
                    format!("{padding}{text}")
                } else {
                    format!("{text}{padding}")
                };
                Ok(Value::str(vm.heap, &out))
            }
            Builtin::StrSplit => {
                let sep = args.take(0);
                if sep.is_undefined() {
                    sep.drop_with_heap(vm.heap);
                    let whole = Value::str(vm.heap, &text);
                    return Ok(Value::Ref(obj::new_array(vm, vec![whole])));
                }
                let sep_text = value::to_string(vm, &sep);
                sep.drop_with_heap(vm.heap);
                let sep_text = sep_text?;
                let parts: Vec<Value> = if sep_text.is_empty() {
                    text.chars().map(|c| Value::str(vm.heap, &c.to_string())).collect()
                } else {
                    text.split(&sep_text as &str).map(|p| Value::str(vm.heap, p)).collect()
                };
                Ok(Value::Ref(obj::new_array(vm, parts)))
            }
            Builtin::StrMatch => {
                let pattern = args.take(0);
                let regex = super::regexp_mod::coerce_to_regex(vm, pattern)?;
                let result = super::regexp_mod::string_match(vm, &text, &regex);
                regex.drop_with_heap(vm.heap);
                result
            }
            Builtin::StrSearch => {
                let pattern = args.take(0);
                let regex = super::regexp_mod::coerce_to_regex(vm, pattern)?;
                let result = super::regexp_mod::string_search(vm, &text, &regex);
                regex.drop_with_heap(vm.heap);
                result
            }
            Builtin::StrReplace => {
                let pattern = args.take(0);
                let replacement = args.take(1);
                string_replace(vm, &text, pattern, replacement)
            }
            Builtin::StrIterator => make_string_iterator(vm, &text),
            _ => unreachable!("string dispatch covers every variant"),
        }
    })();
    this.drop_with_heap(vm.heap);
    args.finish(vm);
    result
}

fn take_number(vm: &mut Vm<'_>, args: &mut Args, i: usize, default: f64) -> RunResult<f64> {
    let v = args.take(i);
    if v.is_undefined() {
        return Ok(default);
    }
    let n = value::to_number(vm, &v);
    v.drop_with_heap(vm.heap);
    n
}

fn relative(n: f64, len: usize) -> usize {
    if n.is_nan() {
        return 0;
    }
    if n < 0.0 {
        let from_end = len as f64 + n;
        if from_end < 0.0 { 0 } else { from_end as usize }
    } else {
        (n as usize).min(len)
    }
}

/// `String.prototype.replace`: string patterns replace the first
/// occurrence; regex patterns delegate to the regex engine (respecting
/// `g`), with `$&`/`$1`… substitutions and function replacers.
fn string_replace(vm: &mut Vm<'_>, text: &str, pattern: Value, replacement: Value) -> RunResult<Value> {
    if let Value::Ref(id) = &pattern
        && vm.heap.regex(*id).is_some()
    {
        let result = super::regexp_mod::regex_replace(vm, text, &pattern, replacement);
        pattern.drop_with_heap(vm.heap);
        return result;
    }
    let needle = value::to_string(vm, &pattern);
    pattern.drop_with_heap(vm.heap);
    let needle = match needle {
        Ok(n) => n,
        Err(e) => {
            replacement.drop_with_heap(vm.heap);
            return Err(e);
        }
    };
    let Some(pos) = text.find(&needle) else {
        replacement.drop_with_heap(vm.heap);
        return Ok(Value::str(vm.heap, text));
    };
    let replaced = if replacement.is_callable(vm.heap) {
        let matched = Value::str(vm.heap, &needle);
        let char_pos = text[..pos].chars().count();
        let whole = Value::str(vm.heap, text);
        let result = call::call_value(
            vm,
            &replacement,
            Value::Undefined,
            vec![matched, Value::Number(char_pos as f64), whole],
            crate::ast::Span::default(),
        );
        replacement.drop_with_heap(vm.heap);
        let result = result?;
        let s = value::to_string(vm, &result);
        result.drop_with_heap(vm.heap);
        s?
    } else {
        let template = value::to_string(vm, &replacement);
        replacement.drop_with_heap(vm.heap);
        let template = template?;
        template.replace("$&", &needle)
    };
    let out = format!("{}{}{}", &text[..pos], replaced, &text[pos + needle.len()..]);
    Ok(Value::str(vm.heap, &out))
}

fn make_string_iterator(vm: &mut Vm<'_>, text: &str) -> RunResult<Value> {
    let proto = vm.realm.intrinsics.object_prototype;
    vm.heap.inc_ref(proto);
    let mut table = PropTable::new(Some(proto));
    let target = Value::str(vm.heap, text);
    let target_key = PropKey::Atom(vm.interns.intern("__target"));
    let index_key = PropKey::Atom(vm.interns.intern("__index"));
    table.insert(target_key, Property::builtin(target));
    table.insert(index_key, Property::builtin(Value::Number(0.0)));
    let iter = vm.heap.alloc(HeapData::Object(table));
    let next_name = vm.interns.intern("next");
    let next_fn = call::make_builtin_fn(vm, next_name, Builtin::StrIterNext);
    obj::define(vm.heap, iter, PropKey::Atom(next_name), Property::builtin(next_fn));
    let identity = call::make_builtin_fn(vm, StaticStrings::Value.id(), Builtin::IdentityThis);
    obj::define(vm.heap, iter, PropKey::Sym(SymbolId::ITERATOR), Property::builtin(identity));
    Ok(Value::Ref(iter))
}

fn str_iter_next(vm: &mut Vm<'_>, this: Value, args: Args) -> RunResult<Value> {
    args.finish(vm);
    let target_key = PropKey::Atom(vm.interns.intern("__target"));
    let index_key = PropKey::Atom(vm.interns.intern("__index"));
    let target = obj::get(vm, &this, &target_key)?;
    let index_value = obj::get(vm, &this, &index_key)?;
    let index = match &index_value {
        Value::Number(n) => *n as usize,
        _ => 0,
    };
    index_value.drop_with_heap(vm.heap);
    let ch = target.as_js_str(vm.heap, vm.interns).and_then(|s| s.chars().nth(index)).map(|c| c.to_string());
    target.drop_with_heap(vm.heap);
    let result = match ch {
        Some(c) => {
            obj::set(vm, &this, index_key, Value::Number((index + 1) as f64))?;
            let v = Value::str(vm.heap, &c);
            obj::make_iter_result(vm, v, false)
        }
        None => obj::make_iter_result(vm, Value::Undefined, true),
    };
    this.drop_with_heap(vm.heap);
    Ok(result)
}
