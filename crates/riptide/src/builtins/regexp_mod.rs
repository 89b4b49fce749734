//! `RegExp`: construction, `test`/`exec`, and the string-method hooks.

use crate::{
    call::{self, Vm},
    error::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::StaticStrings,
    object::{self as obj, PropKey, PropTable, Property},
    types::regex::JsRegex,
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.regexp_prototype;
    b.method(proto, "test", Builtin::RegExpTest);
    b.method(proto, "exec", Builtin::RegExpExec);
    b.method(proto, "toString", Builtin::RegExpToString);
}

pub(crate) fn install_globals(b: &mut RealmBuilder<'_>, global: HeapId) {
    let ctor = b.constructor("RegExp", Builtin::RegExpCtor, b.intrinsics.regexp_prototype);
    b.builtin_data(global, "RegExp", ctor);
}

/// Builds a regex value (used by `/…/` literals and the constructor).
pub(crate) fn make_regex(vm: &mut Vm<'_>, source: &str, flags: &str) -> RunResult<Value> {
    let proto = vm.realm.intrinsics.regexp_prototype;
    vm.heap.inc_ref(proto);
    let mut table = PropTable::new(Some(proto));
    let source_value = Value::str(vm.heap, source);
    table.insert(PropKey::Atom(StaticStrings::Source.id()), Property::builtin(source_value));
    let flags_value = Value::str(vm.heap, flags);
    table.insert(PropKey::Atom(StaticStrings::Flags.id()), Property::builtin(flags_value));
    table.insert(
        PropKey::Atom(StaticStrings::LastIndex.id()),
        Property { value: crate::object::PropValue::Data { value: Value::Number(0.0), writable: true }, enumerable: false, configurable: false },
    );
    let regex = JsRegex::compile(source, flags, table)
        .map_err(|e| RunError::syntax_error(format!("Invalid regular expression: {e}")))?;
    Ok(Value::Ref(vm.heap.alloc(HeapData::Regex(regex))))
}

pub(crate) fn regexp_callable(vm: &mut Vm<'_>, this: Value, args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    regexp_construct(vm, args)
}

pub(crate) fn regexp_construct(vm: &mut Vm<'_>, mut args: Args) -> RunResult<Value> {
    let pattern = args.take(0);
    let flags = args.take(1);
    args.finish(vm);
    // `new RegExp(other)` clones source and flags.
    if let Value::Ref(id) = &pattern
        && let Some(existing) = vm.heap.regex(*id)
    {
        let source = existing.source.to_string();
        let flag_string = existing.flag_string();
        pattern.drop_with_heap(vm.heap);
        let flags_text = if flags.is_undefined() {
            flag_string
        } else {
            let s = value::to_string(vm, &flags);
            flags.drop_with_heap(vm.heap);
            s?
        };
        return make_regex(vm, &source, &flags_text);
    }
    let source = if pattern.is_undefined() {
        String::new()
    } else {
        let s = value::to_string(vm, &pattern);
        pattern.drop_with_heap(vm.heap);
        s?
    };
    let flags_text = if flags.is_undefined() {
        String::new()
    } else {
        let s = value::to_string(vm, &flags);
        flags.drop_with_heap(vm.heap);
        s?
    };
    make_regex(vm, &source, &flags_text)
}

/// Coerces a string-method pattern argument into a regex value (consumes
/// the argument).
pub(crate) fn coerce_to_regex(vm: &mut Vm<'_>, pattern: Value) -> RunResult<Value> {
    if let Value::Ref(id) = &pattern
        && vm.heap.regex(*id).is_some()
    {
        return Ok(pattern);
    }
    let source = value::to_string(vm, &pattern);
    pattern.drop_with_heap(vm.heap);
    let escaped = escape_literal(&source?);
    make_regex(vm, &escaped, "")
}

/// Escapes a plain string for literal matching.
fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if "\\.+*?()|[]{}^$".contains(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn this_regex(vm: &Vm<'_>, this: &Value) -> RunResult<HeapId> {
    match this {
        Value::Ref(id) if vm.heap.regex(*id).is_some() => Ok(*id),
        _ => Err(RunError::type_error("RegExp method called on a non-RegExp")),
    }
}

fn read_last_index(vm: &mut Vm<'_>, regex: HeapId) -> usize {
    let table = vm.heap.table(regex).expect("regex has a table");
    match table.get_own(&PropKey::Atom(StaticStrings::LastIndex.id())).and_then(|p| p.data_value()) {
        Some(Value::Number(n)) if *n >= 0.0 => *n as usize,
        _ => 0,
    }
}

fn write_last_index(vm: &mut Vm<'_>, regex: HeapId, value: usize) {
    obj::define(
        vm.heap,
        regex,
        PropKey::Atom(StaticStrings::LastIndex.id()),
        Property {
            value: crate::object::PropValue::Data { value: Value::Number(value as f64), writable: true },
            enumerable: false,
            configurable: false,
        },
    );
}

/// One match attempt honoring `lastIndex` for global regexes. Returns the
/// capture list and byte range, or `None`.
fn exec_inner(
    vm: &mut Vm<'_>,
    regex: HeapId,
    text: &str,
) -> RunResult<Option<(Vec<Option<String>>, usize, usize)>> {
    let (global, compiled) = {
        let r = vm.heap.regex(regex).expect("regex checked");
        (r.global, r.regex.clone())
    };
    let start = if global { read_last_index(vm, regex) } else { 0 };
    if start > text.len() {
        if global {
            write_last_index(vm, regex, 0);
        }
        return Ok(None);
    }
    let captures = compiled
        .captures_from_pos(text, start)
        .map_err(|e| RunError::type_error(format!("regular expression failed: {e}")))?;
    let Some(captures) = captures else {
        if global {
            write_last_index(vm, regex, 0);
        }
        return Ok(None);
    };
    let whole = captures.get(0).expect("capture 0 always present");
    let groups: Vec<Option<String>> =
        (0..captures.len()).map(|i| captures.get(i).map(|m| m.as_str().to_owned())).collect();
    if global {
        // Empty matches still advance, or global loops would spin.
        let next = if whole.end() == whole.start() { whole.end() + 1 } else { whole.end() };
        write_last_index(vm, regex, next);
    }
    Ok(Some((groups, whole.start(), whole.end())))
}

/// Builds the exec result array: `[match, ...groups]` with `index` and
/// `input` properties.
fn make_exec_result(vm: &mut Vm<'_>, groups: Vec<Option<String>>, start: usize, text: &str) -> Value {
    let values: Vec<Value> = groups
        .iter()
        .map(|g| match g {
            Some(s) => Value::str(vm.heap, s),
            None => Value::Undefined,
        })
        .collect();
    let array = obj::new_array(vm, values);
    let char_index = text[..start].chars().count();
    obj::define(
        vm.heap,
        array,
        PropKey::Atom(StaticStrings::Index.id()),
        Property::builtin(Value::Number(char_index as f64)),
    );
    let input = Value::str(vm.heap, text);
    obj::define(vm.heap, array, PropKey::Atom(StaticStrings::Input.id()), Property::builtin(input));
    Value::Ref(array)
}

pub(crate) fn dispatch(vm: &mut Vm<'_>, builtin: Builtin, this: Value, mut args: Args) -> RunResult<Value> {
    let result = (|| -> RunResult<Value> {
        let regex = this_regex(vm, &this)?;
        match builtin {
            Builtin::RegExpToString => {
                let r = vm.heap.regex(regex).expect("regex checked");
                let rendered = format!("/{}/{}", r.source, r.flag_string());
                Ok(Value::str(vm.heap, &rendered))
            }
            Builtin::RegExpTest | Builtin::RegExpExec => {
                let input = args.take(0);
                let text = value::to_string(vm, &input);
                input.drop_with_heap(vm.heap);
                let text = text?;
                let matched = exec_inner(vm, regex, &text)?;
                match builtin {
                    Builtin::RegExpTest => Ok(Value::Bool(matched.is_some())),
                    _ => Ok(match matched {
                        Some((groups, start, _)) => make_exec_result(vm, groups, start, &text),
                        None => Value::Null,
                    }),
                }
            }
            _ => unreachable!("regexp dispatch covers every variant"),
        }
    })();
    this.drop_with_heap(vm.heap);
    args.finish(vm);
    result
}

/// `String.prototype.match` backing: all matches for `g`, exec result
/// otherwise.
pub(crate) fn string_match(vm: &mut Vm<'_>, text: &str, regex_value: &Value) -> RunResult<Value> {
    let Value::Ref(regex) = regex_value else {
        return Err(RunError::type_error("match requires a RegExp"));
    };
    let regex = *regex;
    let global = vm.heap.regex(regex).expect("regex checked").global;
    if !global {
        return Ok(match exec_inner(vm, regex, text)? {
            Some((groups, start, _)) => make_exec_result(vm, groups, start, text),
            None => Value::Null,
        });
    }
    write_last_index(vm, regex, 0);
    let mut out = Vec::new();
    while let Some((groups, _, _)) = exec_inner(vm, regex, text)? {
        let whole = groups[0].clone().unwrap_or_default();
        out.push(Value::str(vm.heap, &whole));
    }
    if out.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Ref(obj::new_array(vm, out)))
}

/// `String.prototype.search` backing: character index of the first match.
pub(crate) fn string_search(vm: &mut Vm<'_>, text: &str, regex_value: &Value) -> RunResult<Value> {
    let Value::Ref(regex) = regex_value else {
        return Err(RunError::type_error("search requires a RegExp"));
    };
    let regex = *regex;
    let compiled = vm.heap.regex(regex).expect("regex checked").regex.clone();
    let found = compiled
        .find(text)
        .map_err(|e| RunError::type_error(format!("regular expression failed: {e}")))?;
    Ok(Value::Number(match found {
        Some(m) => text[..m.start()].chars().count() as f64,
        None => -1.0,
    }))
}

/// `String.prototype.replace` backing for regex patterns. Consumes
/// `replacement`.
pub(crate) fn regex_replace(
    vm: &mut Vm<'_>,
    text: &str,
    regex_value: &Value,
    replacement: Value,
) -> RunResult<Value> {
    let Value::Ref(regex) = regex_value else {
        replacement.drop_with_heap(vm.heap);
        return Err(RunError::type_error("replace requires a RegExp"));
    };
    let regex = *regex;
    let global = vm.heap.regex(regex).expect("regex checked").global;
    write_last_index(vm, regex, 0);
    let functional = replacement.is_callable(vm.heap);
    let template = if functional {
        String::new()
    } else {
        match value::to_string(vm, &replacement) {
            Ok(s) => s,
            Err(e) => {
                replacement.drop_with_heap(vm.heap);
                return Err(e);
            }
        }
    };
    let mut out = String::new();
    let mut cursor = 0usize;
    loop {
        // Non-global replace stops after the first match.
        let matched = match exec_inner(vm, regex, &text[cursor..])? {
            Some((groups, start, end)) => (groups, cursor + start, cursor + end),
            None => break,
        };
        let (groups, start, end) = matched;
        out.push_str(&text[cursor..start]);
        if functional {
            let mut call_args: Vec<Value> = Vec::with_capacity(groups.len() + 2);
            for group in &groups {
                call_args.push(match group {
                    Some(g) => Value::str(vm.heap, g),
                    None => Value::Undefined,
                });
            }
            call_args.push(Value::Number(text[..start].chars().count() as f64));
            call_args.push(Value::str(vm.heap, text));
            let result = call::call_value(vm, &replacement, Value::Undefined, call_args, crate::ast::Span::default());
            let result = match result {
                Ok(v) => v,
                Err(e) => {
                    replacement.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let rendered = value::to_string(vm, &result);
            result.drop_with_heap(vm.heap);
            match rendered {
                Ok(s) => out.push_str(&s),
                Err(e) => {
                    replacement.drop_with_heap(vm.heap);
                    return Err(e);
                }
            }
        } else {
            out.push_str(&expand_template(&template, &groups));
        }
        // Advance past this match (empty matches advance one char).
        cursor = if end == start {
            match text[start..].chars().next() {
                Some(c) => {
                    out.push(c);
                    start + c.len_utf8()
                }
                None => {
                    cursor = start;
                    break;
                }
            }
        } else {
            end
        };
        if !global || cursor > text.len() {
            break;
        }
        // exec_inner consumed lastIndex relative to the slice; reset for the
        // next slice-based search.
        write_last_index(vm, regex, 0);
    }
    out.push_str(&text[cursor.min(text.len())..]);
    replacement.drop_with_heap(vm.heap);
    Ok(Value::str(vm.heap, &out))
}

/// `$&`, `$1`…`$9`, and `$$` substitution.
fn expand_template(template: &str, groups: &[Option<String>]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                if let Some(Some(whole)) = groups.first() {
                    out.push_str(whole);
                }
            }
            Some(d) if d.is_ascii_digit() => {
                let index = d.to_digit(10).expect("digit checked") as usize;
                chars.next();
                if let Some(Some(group)) = groups.get(index) {
                    out.push_str(group);
                }
            }
            _ => out.push('$'),
        }
    }
    out
}
