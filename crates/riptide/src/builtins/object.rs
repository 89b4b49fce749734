//! `Object` statics, the base prototypes, wrapper-prototype methods, and the
//! global conversion callables.

use crate::{
    ast::Span,
    call::{self, Vm},
    error::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::SymbolId,
    object::{self as obj, PropKey},
    value::{self, Value},
};

use super::{Args, Builtin, RealmBuilder};

pub(crate) fn install_object_prototype(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.object_prototype;
    b.method(proto, "hasOwnProperty", Builtin::ObjHasOwnProperty);
    b.method(proto, "toString", Builtin::ObjToString);
    b.method(proto, "valueOf", Builtin::ObjValueOf);
}

pub(crate) fn install_function_prototype(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.function_prototype;
    b.method(proto, "call", Builtin::FnCall);
    b.method(proto, "apply", Builtin::FnApply);
    b.method(proto, "toString", Builtin::FnToString);
}

pub(crate) fn install_globals(b: &mut RealmBuilder<'_>, global: HeapId) {
    let object_ctor = b.constructor("Object", Builtin::ObjectCtor, b.intrinsics.object_prototype);
    let Value::Ref(object_id) = &object_ctor else { unreachable!() };
    let object_id = *object_id;
    b.method(object_id, "keys", Builtin::ObjectKeys);
    b.method(object_id, "values", Builtin::ObjectValues);
    b.method(object_id, "entries", Builtin::ObjectEntries);
    b.method(object_id, "assign", Builtin::ObjectAssign);
    b.method(object_id, "freeze", Builtin::ObjectFreeze);
    b.method(object_id, "getPrototypeOf", Builtin::ObjectGetPrototypeOf);
    b.builtin_data(global, "Object", object_ctor);

    let number_ctor = b.constructor("Number", Builtin::NumberCtor, b.intrinsics.number_prototype);
    let Value::Ref(number_id) = &number_ctor else { unreachable!() };
    let number_id = *number_id;
    b.method(number_id, "isInteger", Builtin::NumberIsInteger);
    b.method(number_id, "parseFloat", Builtin::ParseFloat);
    b.method(number_id, "parseInt", Builtin::ParseInt);
    b.builtin_data(number_id, "MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0));
    b.builtin_data(global, "Number", number_ctor);

    let string_ctor = b.constructor("String", Builtin::StringCtor, b.intrinsics.string_prototype);
    b.builtin_data(global, "String", string_ctor);
    let boolean_ctor = b.constructor("Boolean", Builtin::BooleanCtor, b.intrinsics.boolean_prototype);
    b.builtin_data(global, "Boolean", boolean_ctor);
}

pub(crate) fn install_symbol(b: &mut RealmBuilder<'_>, global: HeapId) {
    let symbol_fn = b.function("Symbol", Builtin::SymbolFn);
    let Value::Ref(symbol_id) = &symbol_fn else { unreachable!() };
    let symbol_id = *symbol_id;
    b.builtin_data(symbol_id, "iterator", Value::Sym(SymbolId::ITERATOR));
    b.builtin_data(symbol_id, "asyncIterator", Value::Sym(SymbolId::ASYNC_ITERATOR));
    b.builtin_data(global, "Symbol", symbol_fn);
}

pub(crate) fn dispatch(vm: &mut Vm<'_>, builtin: Builtin, this: Value, mut args: Args) -> RunResult<Value> {
    match builtin {
        Builtin::ObjectKeys | Builtin::ObjectValues | Builtin::ObjectEntries => {
            this.drop_with_heap(vm.heap);
            let target = args.take(0);
            args.finish(vm);
            let Value::Ref(id) = &target else {
                target.drop_with_heap(vm.heap);
                return Ok(Value::Ref(obj::new_array(vm, Vec::new())));
            };
            let keys = obj::enumerable_own_string_keys(vm.heap, *id);
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                let entry = match builtin {
                    Builtin::ObjectKeys => key_to_value(vm, &key),
                    Builtin::ObjectValues => match obj::get(vm, &target, &key) {
                        Ok(v) => v,
                        Err(e) => {
                            target.drop_with_heap(vm.heap);
                            vm.drop_values(out);
                            return Err(e);
                        }
                    },
                    _ => {
                        let k = key_to_value(vm, &key);
                        let v = match obj::get(vm, &target, &key) {
                            Ok(v) => v,
                            Err(e) => {
                                k.drop_with_heap(vm.heap);
                                target.drop_with_heap(vm.heap);
                                vm.drop_values(out);
                                return Err(e);
                            }
                        };
                        Value::Ref(obj::new_array(vm, vec![k, v]))
                    }
                };
                out.push(entry);
            }
            target.drop_with_heap(vm.heap);
            Ok(Value::Ref(obj::new_array(vm, out)))
        }
        Builtin::ObjectAssign => {
            this.drop_with_heap(vm.heap);
            let target = args.take(0);
            if !target.is_object(vm.heap) {
                args.finish(vm);
                target.drop_with_heap(vm.heap);
                return Err(RunError::type_error("Cannot convert undefined or null to object"));
            }
            let sources = args.take_all();
            args.finish(vm);
            for source in sources {
                if let Value::Ref(sid) = &source {
                    let keys = obj::enumerable_own_string_keys(vm.heap, *sid);
                    for key in keys {
                        let v = match obj::get(vm, &source, &key) {
                            Ok(v) => v,
                            Err(e) => {
                                source.drop_with_heap(vm.heap);
                                target.drop_with_heap(vm.heap);
                                return Err(e);
                            }
                        };
                        if let Err(e) = obj::set(vm, &target, key, v) {
                            source.drop_with_heap(vm.heap);
                            target.drop_with_heap(vm.heap);
                            return Err(e);
                        }
                    }
                }
                source.drop_with_heap(vm.heap);
            }
            Ok(target)
        }
        Builtin::ObjectFreeze => {
            this.drop_with_heap(vm.heap);
            let target = args.take(0);
            args.finish(vm);
            if let Value::Ref(id) = &target {
                obj::freeze(vm.heap, *id);
            }
            Ok(target)
        }
        Builtin::ObjectGetPrototypeOf => {
            this.drop_with_heap(vm.heap);
            let target = args.take(0);
            args.finish(vm);
            let proto = match &target {
                Value::Ref(id) => vm.heap.table(*id).and_then(|t| t.proto),
                _ => None,
            };
            target.drop_with_heap(vm.heap);
            Ok(match proto {
                Some(id) => {
                    vm.heap.inc_ref(id);
                    Value::Ref(id)
                }
                None => Value::Null,
            })
        }
        Builtin::ObjHasOwnProperty => {
            let key_value = args.take(0);
            args.finish(vm);
            let key = value::to_property_key(vm, &key_value);
            key_value.drop_with_heap(vm.heap);
            let key = match key {
                Ok(k) => k,
                Err(e) => {
                    this.drop_with_heap(vm.heap);
                    return Err(e);
                }
            };
            let result = match &this {
                Value::Ref(id) => {
                    if let Some(array) = vm.heap.array(*id)
                        && let PropKey::Index(i) = key
                    {
                        (i as usize) < array.elements.len()
                    } else {
                        vm.heap.table(*id).is_some_and(|t| t.contains(&key))
                    }
                }
                _ => false,
            };
            this.drop_with_heap(vm.heap);
            Ok(Value::Bool(result))
        }
        Builtin::ObjToString => {
            args.finish(vm);
            let tag = match &this {
                Value::Ref(id) => match vm.heap.get(*id) {
                    HeapData::Array(_) => "[object Array]",
                    HeapData::Function(_) => "[object Function]",
                    _ => "[object Object]",
                },
                Value::Null => "[object Null]",
                Value::Undefined => "[object Undefined]",
                _ => "[object Object]",
            };
            this.drop_with_heap(vm.heap);
            Ok(Value::str(vm.heap, tag))
        }
        Builtin::ObjValueOf => {
            args.finish(vm);
            Ok(this)
        }
        _ => unreachable!("object dispatch covers every variant"),
    }
}

fn key_to_value(vm: &mut Vm<'_>, key: &PropKey) -> Value {
    match key {
        PropKey::Atom(id) => Value::Str(*id),
        PropKey::Index(i) => Value::str(vm.heap, &i.to_string()),
        PropKey::Sym(sym) => Value::Sym(*sym),
    }
}

pub(crate) fn fn_dispatch(
    vm: &mut Vm<'_>,
    builtin: Builtin,
    this: Value,
    mut args: Args,
    span: Span,
) -> RunResult<Value> {
    match builtin {
        Builtin::FnCall => {
            let bound_this = args.take(0);
            let rest = args.take_all();
            args.finish(vm);
            let result = call::call_value(vm, &this, bound_this, rest, span);
            this.drop_with_heap(vm.heap);
            result
        }
        Builtin::FnApply => {
            let bound_this = args.take(0);
            let arg_array = args.take(1);
            args.finish(vm);
            let spread = if arg_array.is_nullish() {
                arg_array.drop_with_heap(vm.heap);
                Vec::new()
            } else {
                match crate::interp::iterate_to_vec(vm, arg_array, span) {
                    Ok(v) => v,
                    Err(e) => {
                        bound_this.drop_with_heap(vm.heap);
                        this.drop_with_heap(vm.heap);
                        return Err(e);
                    }
                }
            };
            let result = call::call_value(vm, &this, bound_this, spread, span);
            this.drop_with_heap(vm.heap);
            result
        }
        Builtin::FnToString => {
            args.finish(vm);
            let name = match &this {
                Value::Ref(id) => vm.heap.function(*id).map(|f| vm.interns.get(f.name).to_owned()),
                _ => None,
            };
            this.drop_with_heap(vm.heap);
            let name = name.ok_or_else(|| RunError::type_error("Function.prototype.toString requires a function"))?;
            Ok(Value::str(vm.heap, &format!("function {name}() {{ [native code] }}")))
        }
        _ => unreachable!(),
    }
}

pub(crate) fn primitive_dispatch(
    vm: &mut Vm<'_>,
    builtin: Builtin,
    this: Value,
    mut args: Args,
) -> RunResult<Value> {
    match builtin {
        Builtin::NumToString => {
            let radix = args.take(0);
            args.finish(vm);
            let Value::Number(n) = &this else {
                radix.drop_with_heap(vm.heap);
                this.drop_with_heap(vm.heap);
                return Err(RunError::type_error("Number.prototype.toString requires a number"));
            };
            let n = *n;
            let rendered = if radix.is_undefined() {
                value::number_to_string(n)
            } else {
                let r = value::to_number(vm, &radix);
                radix.drop_with_heap(vm.heap);
                let r = r? as u32;
                if !(2..=36).contains(&r) {
                    return Err(RunError::range_error("toString() radix must be between 2 and 36"));
                }
                if r == 10 { value::number_to_string(n) } else { radix_string(n, r) }
            };
            Ok(Value::str(vm.heap, &rendered))
        }
        Builtin::NumValueOf | Builtin::BoolValueOf => {
            args.finish(vm);
            Ok(this)
        }
        Builtin::BoolToString => {
            args.finish(vm);
            let rendered = match &this {
                Value::Bool(b) => b.to_string(),
                _ => {
                    this.drop_with_heap(vm.heap);
                    return Err(RunError::type_error("Boolean.prototype.toString requires a boolean"));
                }
            };
            Ok(Value::str(vm.heap, &rendered))
        }
        _ => unreachable!(),
    }
}

/// Integer rendering in an arbitrary radix (fractional parts truncate).
fn radix_string(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() };
    }
    let negative = n < 0.0;
    let mut i = n.abs().trunc() as u64;
    let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(digits[(i % u64::from(radix)) as usize]);
        i /= u64::from(radix);
        if i == 0 {
            break;
        }
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).expect("radix digits are ASCII")
}

// ---------------------------------------------------------------------------
// Global conversion callables

pub(crate) fn parse_int(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let input = args.take(0);
    let radix = args.take(1);
    args.finish(vm);
    let text = value::to_string(vm, &input);
    input.drop_with_heap(vm.heap);
    let radix_n = value::to_number(vm, &radix);
    radix.drop_with_heap(vm.heap);
    let text = text?;
    let radix_n = radix_n? as i64;
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (radix_n, digits) = if radix_n == 0 || radix_n == 16 {
        match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            Some(rest) => (16, rest),
            None => (if radix_n == 0 { 10 } else { radix_n }, digits),
        }
    } else {
        (radix_n, digits)
    };
    if !(2..=36).contains(&radix_n) {
        return Ok(Value::Number(f64::NAN));
    }
    let mut result = 0f64;
    let mut seen = false;
    for ch in digits.chars() {
        let Some(digit) = ch.to_digit(36).filter(|d| i64::from(*d) < radix_n) else { break };
        result = result * radix_n as f64 + f64::from(digit);
        seen = true;
    }
    if !seen {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(if negative { -result } else { result }))
}

pub(crate) fn parse_float(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let input = args.take(0);
    args.finish(vm);
    let text = value::to_string(vm, &input);
    input.drop_with_heap(vm.heap);
    let text = text?;
    let trimmed = text.trim();
    // Longest numeric prefix.
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let b = bytes[end];
        let ok = b.is_ascii_digit()
            || (end == 0 && (b == b'-' || b == b'+'))
            || (b == b'.' && !seen_dot && !seen_exp)
            || ((b == b'e' || b == b'E') && !seen_exp && end > 0)
            || ((b == b'-' || b == b'+') && end > 0 && (bytes[end - 1] == b'e' || bytes[end - 1] == b'E'));
        if !ok {
            break;
        }
        if b == b'.' {
            seen_dot = true;
        }
        if b == b'e' || b == b'E' {
            seen_exp = true;
        }
        end += 1;
    }
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return Ok(Value::Number(f64::INFINITY));
    }
    if trimmed.starts_with("-Infinity") {
        return Ok(Value::Number(f64::NEG_INFINITY));
    }
    Ok(Value::Number(trimmed[..end].parse::<f64>().unwrap_or(f64::NAN)))
}

pub(crate) fn is_nan(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let v = args.take(0);
    args.finish(vm);
    let n = value::to_number(vm, &v);
    v.drop_with_heap(vm.heap);
    Ok(Value::Bool(n?.is_nan()))
}

pub(crate) fn is_finite(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let v = args.take(0);
    args.finish(vm);
    let n = value::to_number(vm, &v);
    v.drop_with_heap(vm.heap);
    Ok(Value::Bool(n?.is_finite()))
}

/// `Number.isInteger`: no coercion, unlike the global `isFinite`.
pub(crate) fn number_is_integer(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let v = args.take(0);
    args.finish(vm);
    let result = matches!(&v, Value::Number(n) if n.is_finite() && n.fract() == 0.0);
    v.drop_with_heap(vm.heap);
    Ok(Value::Bool(result))
}

pub(crate) fn string_conversion(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let v = args.take(0);
    args.finish(vm);
    // `String(sym)` is the one sanctioned symbol-to-string conversion.
    if let Value::Sym(sym) = &v {
        let rendered = vm.interns.symbol_to_string(*sym);
        return Ok(Value::str(vm.heap, &rendered));
    }
    let s = value::to_string(vm, &v);
    v.drop_with_heap(vm.heap);
    Ok(Value::str(vm.heap, &s?))
}

pub(crate) fn number_conversion(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let v = args.take(0);
    args.finish(vm);
    let n = value::to_number(vm, &v);
    v.drop_with_heap(vm.heap);
    Ok(Value::Number(n?))
}

pub(crate) fn boolean_conversion(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let v = args.take(0);
    args.finish(vm);
    let b = v.to_boolean(vm.heap, vm.interns);
    v.drop_with_heap(vm.heap);
    Ok(Value::Bool(b))
}

pub(crate) fn object_callable(vm: &mut Vm<'_>, this: Value, args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    object_construct(vm, args)
}

pub(crate) fn object_construct(vm: &mut Vm<'_>, mut args: Args) -> RunResult<Value> {
    let v = args.take(0);
    args.finish(vm);
    if v.is_object(vm.heap) {
        return Ok(v);
    }
    v.drop_with_heap(vm.heap);
    let proto = vm.realm.intrinsics.object_prototype;
    vm.heap.inc_ref(proto);
    Ok(Value::Ref(obj::new_object(vm.heap, Some(proto))))
}

pub(crate) fn symbol_callable(vm: &mut Vm<'_>, this: Value, mut args: Args) -> RunResult<Value> {
    this.drop_with_heap(vm.heap);
    let desc = args.take(0);
    args.finish(vm);
    let description = if desc.is_undefined() {
        None
    } else {
        let s = value::to_string(vm, &desc);
        desc.drop_with_heap(vm.heap);
        Some(s?)
    };
    let sym = vm.interns.new_symbol(description.as_deref());
    Ok(Value::Sym(sym))
}
